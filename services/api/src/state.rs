//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the catalog, the
//! model client and the settings every connection is built from.

use crate::config::Config;
use parley_core::{
    EngineConfig, llm_client::DialogueModel, prompt::PromptSet, topic::TopicCatalog,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<TopicCatalog>,
    /// `None` when no API key is configured.
    pub model: Option<Arc<dyn DialogueModel>>,
    pub prompts: Arc<PromptSet>,
}

impl AppState {
    pub fn engine_config(&self) -> EngineConfig {
        self.config.engine_config(self.prompts.as_ref().clone())
    }
}
