//! Manages the WebSocket connection lifecycle for one learner's session.

use super::{
    devices::{ClientRecognizer, ClientSynthesizer},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parley_core::{
    DialogueSession, EngineError, SessionOrchestrator,
    capture::{CaptureSignal, RecognitionSettings, UtteranceCapture, wait_for_silence},
    orchestrator::STATUS_LISTENING,
    speech::SpeechOutput,
};
use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{sync::mpsc, task::JoinSet, time::Instant};
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Outbound messages from the loop, the speech adapters and the turn tasks
/// all go through one channel drained by a writer task.
#[instrument(name = "ws_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));
    info!("New WebSocket connection.");

    let (socket_tx, socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_outbound(socket_tx, outbound_rx).in_current_span());

    let runtime_span = tracing::info_span!("dialogue_runtime", %connection_id);
    let connection = Connection::new(state, outbound_tx, connection_id);
    if let Err(e) = connection.run(socket_rx).instrument(runtime_span).await {
        error!(error = ?e, "Dialogue session terminated with error.");
    }

    writer.abort();
    info!("WebSocket connection closed.");
}

/// Writes queued server messages to the socket until either side closes.
async fn forward_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            warn!(error = %e, "Failed to write to client WebSocket.");
            break;
        }
    }
}

/// Per-connection engine: utterance capture plus the session orchestrator.
struct Connection {
    state: Arc<AppState>,
    connection_id: Uuid,
    orchestrator: Arc<SessionOrchestrator>,
    capture: UtteranceCapture,
    recognition_supported: Arc<AtomicBool>,
    synthesizer: Arc<ClientSynthesizer>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    snapshots: mpsc::UnboundedReceiver<parley_core::SessionSnapshot>,
    /// Model-bound operations. Dropping the set aborts them.
    turns: JoinSet<()>,
}

impl Connection {
    fn new(
        state: Arc<AppState>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        connection_id: Uuid,
    ) -> Self {
        let engine_config = state.engine_config();
        let recognition_supported = Arc::new(AtomicBool::new(false));
        let synthesizer = Arc::new(ClientSynthesizer::new(outbound.clone()));
        let capture = UtteranceCapture::new(
            Box::new(ClientRecognizer::new(
                recognition_supported.clone(),
                outbound.clone(),
            )),
            RecognitionSettings::continuous(engine_config.language.clone()),
            engine_config.silence_timeout,
        );

        let (snapshot_tx, snapshots) = mpsc::unbounded_channel();
        let session = DialogueSession::new(state.model.clone(), engine_config);
        let orchestrator = SessionOrchestrator::new(session, SpeechOutput::new(synthesizer.clone()))
            .with_updates(snapshot_tx);

        Self {
            state,
            connection_id,
            orchestrator: Arc::new(orchestrator),
            capture,
            recognition_supported,
            synthesizer,
            outbound,
            snapshots,
            turns: JoinSet::new(),
        }
    }

    /// The main event loop for an active WebSocket session.
    ///
    /// Consumes client messages, forwards session snapshots, and fires the
    /// capture silence timer. Model calls run as tasks so capture events keep
    /// flowing while a turn is pending.
    async fn run(mut self, mut socket_rx: SplitStream<WebSocket>) -> Result<()> {
        self.send(ServerMessage::Initialized {
            connection_id: self.connection_id,
            language: self.orchestrator.language().to_string(),
        })?;
        self.send(ServerMessage::Snapshot {
            snapshot: self.orchestrator.snapshot(),
        })?;

        loop {
            tokio::select! {
                msg_result = socket_rx.next() => {
                    match msg_result {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(msg) => self.handle_client_message(msg).await?,
                                Err(e) => {
                                    warn!(error = %e, "Ignoring malformed client message.");
                                    self.send(ServerMessage::Error {
                                        message: format!("Invalid message: {}", e),
                                    })?;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Client closed the connection.");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Error receiving from client WebSocket: {:?}", e);
                            break;
                        }
                    }
                },
                Some(snapshot) = self.snapshots.recv() => {
                    self.send(ServerMessage::Snapshot { snapshot })?;
                },
                _ = wait_for_silence(self.capture.deadline()) => {
                    self.on_silence_elapsed()?;
                },
                Some(joined) = self.turns.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Session task panicked.");
                        }
                    }
                },
            }
        }

        if !self.turns.is_empty() {
            info!(pending = self.turns.len(), "Aborting in-flight session tasks.");
        }
        Ok(())
    }

    async fn handle_client_message(&mut self, msg: ClientMessage) -> Result<()> {
        match msg {
            ClientMessage::Capabilities {
                recognition_supported,
                voices,
            } => {
                info!(recognition_supported, voices = voices.len(), "Client capabilities received.");
                self.recognition_supported
                    .store(recognition_supported, Ordering::Relaxed);
                self.synthesizer.set_voices(voices);
            }
            ClientMessage::Voices { voices } => self.synthesizer.set_voices(voices),
            ClientMessage::SelectTopic { topic_id } => match self.state.catalog.get(&topic_id) {
                Some(topic) => {
                    let topic = topic.clone();
                    let orchestrator = self.orchestrator.clone();
                    self.spawn_operation(async move { orchestrator.select_topic(topic).await });
                }
                None => self.report(EngineError::UnknownTopic(topic_id))?,
            },
            ClientMessage::SetCorrection { enabled } => {
                let orchestrator = self.orchestrator.clone();
                self.spawn_operation(async move { orchestrator.set_correction_mode(enabled).await });
            }
            ClientMessage::StartListening => match self.capture.start() {
                Ok(()) => {
                    self.orchestrator.set_status(STATUS_LISTENING);
                    self.send_capture_state()?;
                }
                Err(e) => {
                    self.orchestrator.set_status(format!("❌ {}", e));
                    self.report(e)?;
                }
            },
            ClientMessage::StopListening => {
                self.capture.stop();
                self.send_capture_state()?;
            }
            ClientMessage::Recognition { event } => {
                if let Some(signal) = self.capture.handle_event(event, Instant::now()) {
                    self.on_capture_signal(signal).await?;
                }
            }
            ClientMessage::UserMessage { text } => {
                let orchestrator = self.orchestrator.clone();
                self.spawn_operation(async move { orchestrator.submit_utterance(&text).await });
            }
            ClientMessage::Suggestion { text } => {
                let orchestrator = self.orchestrator.clone();
                self.spawn_operation(async move { orchestrator.submit_suggestion(&text).await });
            }
            ClientMessage::Reset => {
                let orchestrator = self.orchestrator.clone();
                self.spawn_operation(async move { orchestrator.reset_conversation().await });
            }
            ClientMessage::Replay { index } => {
                if let Err(e) = self.orchestrator.replay(index) {
                    self.report(e)?;
                }
            }
        }
        Ok(())
    }

    /// Asks the recognizer to stop once the user has been quiet long enough.
    fn on_silence_elapsed(&mut self) -> Result<()> {
        if self.capture.on_silence(Instant::now()) {
            self.send_capture_state()?;
        }
        Ok(())
    }

    /// Utterances become turns; the other signals only touch the status line.
    async fn on_capture_signal(&mut self, signal: CaptureSignal) -> Result<()> {
        if signal.is_terminal() {
            self.send_capture_state()?;
        }
        match signal {
            CaptureSignal::Utterance(_) => {
                let orchestrator = self.orchestrator.clone();
                self.spawn_operation(async move { orchestrator.handle_capture(signal).await });
            }
            other => {
                if let Err(e) = self.orchestrator.handle_capture(other).await {
                    self.report(e)?;
                }
            }
        }
        Ok(())
    }

    fn spawn_operation<F, T>(&mut self, operation: F)
    where
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
        T: Send + 'static,
    {
        let outbound = self.outbound.clone();
        self.turns.spawn(
            async move {
                match operation.await {
                    Ok(_) | Err(EngineError::Superseded) => {}
                    Err(e) => {
                        if outbound
                            .send(ServerMessage::Error {
                                message: e.to_string(),
                            })
                            .is_err()
                        {
                            debug!("Client gone before error could be reported.");
                        }
                    }
                }
            }
            .in_current_span(),
        );
    }

    fn report(&self, err: EngineError) -> Result<()> {
        warn!(error = %err, "Client request failed.");
        self.send(ServerMessage::Error {
            message: err.to_string(),
        })
    }

    fn send_capture_state(&self) -> Result<()> {
        self.send(ServerMessage::CaptureState {
            state: self.capture.state(),
        })
    }

    fn send(&self, msg: ServerMessage) -> Result<()> {
        self.outbound
            .send(msg)
            .context("Outbound channel to client is closed")
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
