use crate::capture::DEFAULT_SILENCE_TIMEOUT;
use crate::llm_client::GenerationConfig;
use crate::prompt::PromptSet;
use std::time::Duration;

/// Tunables of one dialogue engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// BCP 47 tag used for recognition and synthesis (e.g., "ru-RU").
    pub language: String,
    /// History length at which the conversation ends.
    pub max_messages: usize,
    pub silence_timeout: Duration,
    /// Upper bound on a single model call. `None` waits forever.
    pub turn_timeout: Option<Duration>,
    pub generation: GenerationConfig,
    pub prompts: PromptSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: "ru-RU".to_string(),
            max_messages: 20,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            turn_timeout: Some(Duration::from_secs(30)),
            generation: GenerationConfig::default(),
            prompts: PromptSet::default(),
        }
    }
}
