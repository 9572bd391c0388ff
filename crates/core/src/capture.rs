//! Silence-endpointed utterance capture over a continuous recognizer.
//!
//! Enforces the capture lifecycle:
//! - Idle -> Listening (start)
//! - Listening -> Finalizing (silence timeout or explicit stop; engine asked to stop)
//! - Listening | Finalizing -> Idle (engine end: utterance or no-speech)
//! - Listening | Finalizing -> Idle (engine error)
//!
//! The silence timer is a single optional deadline. The host loop sleeps until
//! [`UtteranceCapture::deadline`] and then calls [`UtteranceCapture::on_silence`].

use crate::error::EngineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(2500);

/// How the recognition engine is asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl RecognitionSettings {
    /// Continuous recognition with interim results and a single alternative.
    pub fn continuous(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

/// One recognized span, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSegment {
    pub transcript: String,
    pub is_final: bool,
}

/// Notifications emitted by a recognition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognitionEvent {
    Start,
    /// `results` is the engine's full result list; entries from
    /// `result_index` on are new or changed.
    Result {
        result_index: usize,
        results: Vec<RecognitionSegment>,
    },
    Error {
        code: String,
    },
    End,
}

/// Speech recognition capability of the host.
#[cfg_attr(test, mockall::automock)]
pub trait RecognitionEngine: Send {
    fn is_supported(&self) -> bool;

    fn start(&mut self, settings: &RecognitionSettings) -> Result<()>;

    /// Requests the engine to stop. The engine answers with an `End` event.
    fn stop(&mut self);
}

/// Recognizer for hosts without speech recognition.
#[derive(Debug, Default)]
pub struct NullRecognizer;

impl RecognitionEngine for NullRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(&mut self, _settings: &RecognitionSettings) -> Result<()> {
        anyhow::bail!("speech recognition is not available")
    }

    fn stop(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Listening,
    Finalizing,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Listening => write!(f, "Listening"),
            CaptureState::Finalizing => write!(f, "Finalizing"),
        }
    }
}

/// What a capture session reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSignal {
    /// Current working transcript while speech is coming in.
    Hearing(String),
    /// A finalized utterance.
    Utterance(String),
    /// The session ended without any recognized text.
    NoSpeech,
    /// The engine reported an error code.
    Error(String),
}

impl CaptureSignal {
    /// True for the single signal that closes a listening session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaptureSignal::Hearing(_))
    }
}

/// Segments a continuous recognition stream into utterances.
pub struct UtteranceCapture {
    engine: Box<dyn RecognitionEngine>,
    settings: RecognitionSettings,
    silence_timeout: Duration,
    state: CaptureState,
    deadline: Option<Instant>,
    finals: BTreeMap<usize, String>,
    transcript: String,
}

impl fmt::Debug for UtteranceCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtteranceCapture")
            .field("settings", &self.settings)
            .field("silence_timeout", &self.silence_timeout)
            .field("state", &self.state)
            .field("deadline", &self.deadline)
            .field("transcript", &self.transcript)
            .finish()
    }
}

impl UtteranceCapture {
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        settings: RecognitionSettings,
        silence_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            settings,
            silence_timeout,
            state: CaptureState::Idle,
            deadline: None,
            finals: BTreeMap::new(),
            transcript: String::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// When the silence timer fires, if it is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The working transcript of the current session.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Opens the recognizer. A no-op while a session is already running.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.state != CaptureState::Idle {
            debug!(state = %self.state, "Capture already running, ignoring start");
            return Ok(());
        }
        if !self.engine.is_supported() {
            return Err(EngineError::EngineUnsupported);
        }

        self.reset_transcript();
        self.deadline = None;
        self.engine
            .start(&self.settings)
            .map_err(|e| EngineError::Recognition(format!("{:#}", e)))?;
        self.state = CaptureState::Listening;
        info!(lang = %self.settings.lang, "Capture listening");
        Ok(())
    }

    /// Explicit stop. Finalization still happens on the engine's end event.
    pub fn stop(&mut self) {
        if self.state != CaptureState::Listening {
            return;
        }
        self.request_stop();
        info!("Capture stopped by user");
    }

    /// Fires the silence timer if its deadline has passed.
    ///
    /// Returns true when the engine was asked to stop.
    pub fn on_silence(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if self.state == CaptureState::Listening && now >= deadline => {
                self.request_stop();
                info!(transcript_len = self.transcript.len(), "Silence timeout reached");
                true
            }
            _ => false,
        }
    }

    /// Feeds one engine notification through the state machine.
    pub fn handle_event(&mut self, event: RecognitionEvent, now: Instant) -> Option<CaptureSignal> {
        if self.state == CaptureState::Idle {
            debug!(?event, "Ignoring recognition event while idle");
            return None;
        }

        match event {
            RecognitionEvent::Start => None,
            RecognitionEvent::Result {
                result_index,
                results,
            } => self.on_result(result_index, &results, now),
            RecognitionEvent::Error { code } => {
                warn!(%code, state = %self.state, "Recognition engine error");
                self.deadline = None;
                self.reset_transcript();
                self.state = CaptureState::Idle;
                Some(CaptureSignal::Error(code))
            }
            RecognitionEvent::End => Some(self.finalize()),
        }
    }

    fn on_result(
        &mut self,
        result_index: usize,
        results: &[RecognitionSegment],
        now: Instant,
    ) -> Option<CaptureSignal> {
        self.finals.retain(|index, _| *index < result_index);
        let mut interim = String::new();
        for (index, segment) in results.iter().enumerate().skip(result_index) {
            if segment.is_final {
                self.finals.insert(index, segment.transcript.clone());
            } else {
                interim.push_str(&segment.transcript);
            }
        }

        let finals: String = self.finals.values().map(String::as_str).collect();
        let current = if finals.is_empty() { interim } else { finals };
        if current.is_empty() {
            return None;
        }

        if self.state == CaptureState::Listening {
            self.deadline = Some(now + self.silence_timeout);
        }
        self.transcript = current.clone();
        Some(CaptureSignal::Hearing(current))
    }

    fn finalize(&mut self) -> CaptureSignal {
        self.deadline = None;
        self.state = CaptureState::Idle;
        let text = self.transcript.trim().to_string();
        self.reset_transcript();

        if text.is_empty() {
            info!("Capture ended without speech");
            CaptureSignal::NoSpeech
        } else {
            info!(text_len = text.len(), "Utterance finalized");
            CaptureSignal::Utterance(text)
        }
    }

    fn request_stop(&mut self) {
        self.deadline = None;
        self.state = CaptureState::Finalizing;
        self.engine.stop();
    }

    fn reset_transcript(&mut self) {
        self.finals.clear();
        self.transcript.clear();
    }
}

/// Resolves when the silence deadline passes; never resolves without one.
pub async fn wait_for_silence(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
