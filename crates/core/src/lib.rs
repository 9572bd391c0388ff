//! Engine for spoken role-play conversations with a generative model.
//!
//! A learner picks a [`topic::Topic`], the model greets them in character, and
//! each captured utterance becomes one turn of a capped conversation. Speech
//! recognition and synthesis are host capabilities reached through the
//! [`capture::RecognitionEngine`] and [`speech::SpeechSynthesizer`] traits.

pub mod capture;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm_client;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod speech;
pub mod topic;

pub use config::EngineConfig;
pub use error::EngineError;
pub use orchestrator::{SessionOrchestrator, SessionSnapshot};
pub use session::{DialogueSession, Lifecycle};
