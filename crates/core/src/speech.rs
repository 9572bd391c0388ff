//! Text-to-speech output in the target language.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A synthesis voice offered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

/// A queued playback request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub lang: String,
    /// Voice name, `None` for the engine default.
    pub voice: Option<String>,
}

/// Speech synthesis capability of the host. Requests play in submission order.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Queues a request for playback without waiting for it.
    fn enqueue(&self, request: SynthesisRequest);
}

/// Synthesizer that keeps every request, for headless runs and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSynthesizer {
    voices: Vec<Voice>,
    spoken: Arc<Mutex<Vec<SynthesisRequest>>>,
}

impl RecordingSynthesizer {
    pub fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<SynthesisRequest> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn enqueue(&self, request: SynthesisRequest) {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(request);
        }
    }
}

/// Fire-and-forget speech in a given language.
#[derive(Clone)]
pub struct SpeechOutput {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl SpeechOutput {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }

    /// Queues `text` for playback with the first voice matching `lang`.
    pub fn speak(&self, text: &str, lang: &str) {
        if text.trim().is_empty() {
            return;
        }
        let voice = select_voice(&self.synthesizer.voices(), lang).map(|v| v.name.clone());
        debug!(text_len = text.len(), %lang, ?voice, "Queueing speech");
        self.synthesizer.enqueue(SynthesisRequest {
            text: text.to_string(),
            lang: lang.to_string(),
            voice,
        });
    }
}

/// First voice whose language tag starts with the primary subtag of `lang`.
pub fn select_voice<'a>(voices: &'a [Voice], lang: &str) -> Option<&'a Voice> {
    let prefix = primary_subtag(lang);
    if prefix.is_empty() {
        return None;
    }
    voices
        .iter()
        .find(|v| v.lang.to_ascii_lowercase().starts_with(&prefix))
}

fn primary_subtag(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
