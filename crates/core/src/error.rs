//! Error taxonomy of the dialogue engine.
//!
//! Every variant is recoverable: the orchestrator turns each one into a status
//! line and leaves history and the single-flight guard consistent.

/// Errors surfaced by capture, dialogue session, and orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A required credential for the dialogue model is not configured.
    #[error("configuration error: {0}")]
    Config(String),
    /// The host offers no speech recognition capability.
    #[error("speech recognition is not supported on this host")]
    EngineUnsupported,
    /// The recognition engine reported an error code.
    #[error("recognition error: {0}")]
    Recognition(String),
    /// The model call failed; the same input may be retried.
    #[error("model error: {0}")]
    Model(String),
    /// Another turn is already in flight.
    #[error("a turn is already in flight")]
    Busy,
    /// The conversation reached its message cap and must be reset.
    #[error("conversation reached the limit of {0} messages")]
    CapReached(usize),
    /// No conversation has been opened and bootstrapped yet.
    #[error("conversation is not initialized")]
    NotInitialized,
    /// The submitted text was blank.
    #[error("input text is empty")]
    EmptyInput,
    /// The conversation was replaced while the turn was in flight.
    #[error("conversation was replaced while the turn was in flight")]
    Superseded,
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("no assistant message at index {0}")]
    NoSuchMessage(usize),
}

impl EngineError {
    /// Wraps a model-side failure, keeping the whole cause chain.
    pub fn model(err: &anyhow::Error) -> Self {
        EngineError::Model(format!("{:#}", err))
    }

    /// Returns true when the conversation can only continue after a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineError::CapReached(_))
    }
}
