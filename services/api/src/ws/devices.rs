//! Speech capabilities backed by the connected browser.
//!
//! Both adapters turn engine calls into outbound protocol messages; the
//! browser's answers come back as client messages on the same socket.

use super::protocol::ServerMessage;
use anyhow::{Context, Result};
use parley_core::{
    capture::{RecognitionEngine, RecognitionSettings},
    speech::{SpeechSynthesizer, SynthesisRequest, Voice},
};
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::mpsc;
use tracing::debug;

/// Drives the browser's speech recognizer.
pub struct ClientRecognizer {
    supported: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl ClientRecognizer {
    /// `supported` is updated when the client reports its capabilities.
    pub fn new(supported: Arc<AtomicBool>, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            supported,
            outbound,
        }
    }
}

impl RecognitionEngine for ClientRecognizer {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::Relaxed)
    }

    fn start(&mut self, settings: &RecognitionSettings) -> Result<()> {
        self.outbound
            .send(ServerMessage::StartRecognition {
                settings: settings.clone(),
            })
            .context("Client connection is closed")
    }

    fn stop(&mut self) {
        if self.outbound.send(ServerMessage::StopRecognition).is_err() {
            debug!("Stop requested after client disconnected");
        }
    }
}

/// Queues speech on the browser's synthesizer.
pub struct ClientSynthesizer {
    voices: RwLock<Vec<Voice>>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl ClientSynthesizer {
    pub fn new(outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            voices: RwLock::new(Vec::new()),
            outbound,
        }
    }

    pub fn set_voices(&self, voices: Vec<Voice>) {
        debug!(count = voices.len(), "Client voice catalog updated");
        *self.voices.write().unwrap_or_else(|e| e.into_inner()) = voices;
    }
}

impl SpeechSynthesizer for ClientSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices
            .read()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn enqueue(&self, request: SynthesisRequest) {
        if self.outbound.send(ServerMessage::Speak { request }).is_err() {
            debug!("Dropping speech for a disconnected client");
        }
    }
}
