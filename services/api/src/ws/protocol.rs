//! Defines the WebSocket message protocol between the browser client and the API server.

use parley_core::{
    SessionSnapshot,
    capture::{CaptureState, RecognitionEvent, RecognitionSettings},
    speech::{SynthesisRequest, Voice},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// What the browser's speech stack can do.
    Capabilities {
        recognition_supported: bool,
        #[serde(default)]
        voices: Vec<Voice>,
    },
    /// The synthesis voice list changed (browsers load it lazily).
    Voices { voices: Vec<Voice> },
    SelectTopic { topic_id: String },
    /// Toggles grammar correction in the agent's replies.
    SetCorrection { enabled: bool },
    StartListening,
    StopListening,
    /// A notification from the browser's speech recognizer.
    Recognition { event: RecognitionEvent },
    /// A typed user turn.
    UserMessage { text: String },
    /// A suggested reply chosen by the user.
    Suggestion { text: String },
    Reset,
    /// Speak the assistant message at `index` again.
    Replay { index: usize },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the connection is ready.
    Initialized { connection_id: Uuid, language: String },
    /// The full, updated session state.
    Snapshot { snapshot: SessionSnapshot },
    /// Asks the browser to start its recognizer with these settings.
    StartRecognition {
        #[serde(flatten)]
        settings: RecognitionSettings,
    },
    StopRecognition,
    /// Queues text for speech synthesis on the browser.
    Speak {
        #[serde(flatten)]
        request: SynthesisRequest,
    },
    CaptureState { state: CaptureState },
    /// Reports a failed operation to the client.
    Error { message: String },
}
