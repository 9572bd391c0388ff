//! Topic selection, the lifecycle gate, and the glue between capture, the
//! dialogue session, and speech output.

use crate::capture::CaptureSignal;
use crate::conversation::{Message, Role};
use crate::error::EngineError;
use crate::parser::ParsedResponse;
use crate::session::{DialogueSession, Lifecycle};
use crate::speech::SpeechOutput;
use crate::topic::Topic;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const STATUS_IDLE: &str = "👋 Choose a conversation";
pub const STATUS_STARTING: &str = "🔄 Starting new conversation...";
pub const STATUS_READY: &str = "✅ Ready for conversation!";
pub const STATUS_SENDING: &str = "💬 Sending...";
pub const STATUS_RESPONDED: &str = "✅ Response complete";
pub const STATUS_LISTENING: &str = "🎙️ Listening... press again to finish";
pub const STATUS_NO_SPEECH: &str = "🛑 No speech detected.";
pub const STATUS_FINISHED: &str = "🏁 Conversation finished. Start a new one to keep practicing.";

/// Read-only view of a session, published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub topic_id: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub lifecycle: Lifecycle,
    pub history: Vec<Message>,
    pub suggestions: Vec<String>,
    pub status: String,
    pub correction: bool,
    pub busy: bool,
}

struct ViewState {
    topic: Option<Topic>,
    correction: bool,
    status: String,
}

/// Drives one learner's role-play session.
pub struct SessionOrchestrator {
    session: DialogueSession,
    speech: SpeechOutput,
    view: Mutex<ViewState>,
    updates: Option<mpsc::UnboundedSender<SessionSnapshot>>,
}

impl SessionOrchestrator {
    pub fn new(session: DialogueSession, speech: SpeechOutput) -> Self {
        Self {
            session,
            speech,
            view: Mutex::new(ViewState {
                topic: None,
                correction: false,
                status: STATUS_IDLE.to_string(),
            }),
            updates: None,
        }
    }

    /// Publishes a [`SessionSnapshot`] on `tx` after every state change.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<SessionSnapshot>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn language(&self) -> &str {
        &self.session.config().language
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.session.lifecycle()
    }

    /// Starts a fresh conversation on `topic` and speaks its greeting.
    pub async fn select_topic(&self, topic: Topic) -> Result<ParsedResponse, EngineError> {
        info!(topic = %topic.id, "Topic selected");
        let correction = {
            let mut view = self.lock_view();
            view.topic = Some(topic.clone());
            view.correction
        };
        self.start_conversation(&topic, correction).await
    }

    /// Replaces the conversation with a new one on the current topic.
    pub async fn reset_conversation(&self) -> Result<ParsedResponse, EngineError> {
        let (topic, correction) = {
            let view = self.lock_view();
            (view.topic.clone(), view.correction)
        };
        match topic {
            Some(topic) => self.start_conversation(&topic, correction).await,
            None => self.fail(EngineError::NotInitialized),
        }
    }

    /// Switches grammar correction on or off.
    ///
    /// With a topic selected the conversation is re-opened so the model picks
    /// up the new instruction. Returns the new greeting in that case.
    pub async fn set_correction_mode(
        &self,
        enabled: bool,
    ) -> Result<Option<ParsedResponse>, EngineError> {
        let topic = {
            let mut view = self.lock_view();
            if view.correction == enabled {
                return Ok(None);
            }
            view.correction = enabled;
            view.topic.clone()
        };
        info!(enabled, "Correction mode changed");
        match topic {
            Some(topic) => self.start_conversation(&topic, enabled).await.map(Some),
            None => {
                self.publish();
                Ok(None)
            }
        }
    }

    pub async fn submit_utterance(&self, text: &str) -> Result<ParsedResponse, EngineError> {
        self.submit(text).await
    }

    pub async fn submit_suggestion(&self, text: &str) -> Result<ParsedResponse, EngineError> {
        self.submit(text).await
    }

    /// Routes a signal from utterance capture.
    ///
    /// Only a finalized utterance reaches the model; the rest update the
    /// status line.
    pub async fn handle_capture(
        &self,
        signal: CaptureSignal,
    ) -> Result<Option<ParsedResponse>, EngineError> {
        match signal {
            CaptureSignal::Utterance(text) => self.submit(&text).await.map(Some),
            CaptureSignal::Hearing(transcript) if transcript.trim().is_empty() => {
                self.set_status(STATUS_LISTENING);
                Ok(None)
            }
            CaptureSignal::Hearing(transcript) => {
                self.set_status(format!("🎙️ {}", transcript.trim()));
                Ok(None)
            }
            CaptureSignal::NoSpeech => {
                self.set_status(STATUS_NO_SPEECH);
                Ok(None)
            }
            CaptureSignal::Error(code) => self.fail(EngineError::Recognition(code)),
        }
    }

    /// Speaks the assistant message at `index` again.
    pub fn replay(&self, index: usize) -> Result<(), EngineError> {
        match self.session.message(index) {
            Some(message) if message.role == Role::Assistant => {
                self.speak(&message.content);
                Ok(())
            }
            _ => Err(EngineError::NoSuchMessage(index)),
        }
    }

    /// Replaces the status line and publishes a snapshot.
    pub fn set_status(&self, status: impl Into<String>) {
        self.lock_view().status = status.into();
        self.publish();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (topic_id, correction, status) = {
            let view = self.lock_view();
            (
                view.topic.as_ref().map(|t| t.id.clone()),
                view.correction,
                view.status.clone(),
            )
        };
        SessionSnapshot {
            topic_id,
            conversation_id: self.session.conversation_id(),
            lifecycle: self.session.lifecycle(),
            history: self.session.history(),
            suggestions: self.session.suggestions(),
            status,
            correction,
            busy: self.session.is_busy(),
        }
    }

    async fn start_conversation(
        &self,
        topic: &Topic,
        correction: bool,
    ) -> Result<ParsedResponse, EngineError> {
        self.session.discard();
        self.set_status(STATUS_STARTING);

        let opened = match self.session.open(topic, correction).await {
            Ok(_) => self.session.bootstrap().await,
            Err(e) => Err(e),
        };
        match opened {
            Ok(greeting) => {
                self.speak(&greeting.reply);
                self.set_status(STATUS_READY);
                Ok(greeting)
            }
            Err(EngineError::Superseded) => Err(EngineError::Superseded),
            Err(e) => self.fail(e),
        }
    }

    async fn submit(&self, text: &str) -> Result<ParsedResponse, EngineError> {
        if self.session.lifecycle() == Lifecycle::Ended {
            return self.fail(EngineError::CapReached(self.session.config().max_messages));
        }
        let pending = match self.session.begin_turn(text) {
            Ok(pending) => pending,
            Err(e) => return self.fail(e),
        };
        self.set_status(STATUS_SENDING);

        match pending.finish().await {
            Ok(parsed) => {
                self.speak(&parsed.reply);
                if self.session.lifecycle() == Lifecycle::Ended {
                    info!("Conversation reached its message cap");
                    self.set_status(STATUS_FINISHED);
                } else {
                    self.set_status(STATUS_RESPONDED);
                }
                Ok(parsed)
            }
            Err(EngineError::Superseded) => {
                debug!("Turn outlived its conversation");
                Err(EngineError::Superseded)
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail<T>(&self, err: EngineError) -> Result<T, EngineError> {
        warn!(error = %err, "Session operation failed");
        let status = if err.is_terminal() {
            STATUS_FINISHED.to_string()
        } else {
            format!("❌ {}", err)
        };
        self.set_status(status);
        Err(err)
    }

    fn speak(&self, text: &str) {
        self.speech.speak(text, self.language());
    }

    fn publish(&self) {
        if let Some(tx) = &self.updates {
            if tx.send(self.snapshot()).is_err() {
                debug!("Snapshot receiver dropped");
            }
        }
    }

    fn lock_view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::llm_client::ScriptedModel;
    use crate::speech::{RecordingSynthesizer, Voice};
    use std::sync::Arc;

    const GREETING: &str =
        "Здравствуйте! Что будете брать?\n\nВарианты ответа:\n– Яблоки\n– Помидоры";

    fn market() -> Topic {
        Topic::new("market", "בשוק", "Ты продавец на рынке.")
    }

    struct Harness {
        model: ScriptedModel,
        synthesizer: RecordingSynthesizer,
        orchestrator: Arc<SessionOrchestrator>,
        snapshots: mpsc::UnboundedReceiver<SessionSnapshot>,
    }

    fn harness(model: ScriptedModel) -> Harness {
        let synthesizer = RecordingSynthesizer::with_voices(vec![Voice {
            name: "Milena".to_string(),
            lang: "ru-RU".to_string(),
        }]);
        let (tx, snapshots) = mpsc::unbounded_channel();
        let session = DialogueSession::new(Some(Arc::new(model.clone())), EngineConfig::default());
        let orchestrator = SessionOrchestrator::new(
            session,
            SpeechOutput::new(Arc::new(synthesizer.clone())),
        )
        .with_updates(tx);
        Harness {
            model,
            synthesizer,
            orchestrator: Arc::new(orchestrator),
            snapshots,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionSnapshot>) -> Vec<SessionSnapshot> {
        let mut out = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            out.push(snapshot);
        }
        out
    }

    #[tokio::test]
    async fn test_select_topic_produces_single_spoken_greeting() {
        let mut h = harness(ScriptedModel::new([GREETING]));

        let greeting = h.orchestrator.select_topic(market()).await.unwrap();
        assert_eq!(greeting.suggestions, vec!["Яблоки", "Помидоры"]);

        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.topic_id.as_deref(), Some("market"));
        assert_eq!(snapshot.lifecycle, Lifecycle::Active);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].role, Role::Assistant);
        assert_eq!(snapshot.suggestions, vec!["Яблоки", "Помидоры"]);
        assert_eq!(snapshot.status, STATUS_READY);
        assert!(!snapshot.busy);

        let spoken = h.synthesizer.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "Здравствуйте! Что будете брать?");
        assert_eq!(spoken[0].voice.as_deref(), Some("Milena"));

        let published = drain(&mut h.snapshots);
        assert_eq!(published.first().unwrap().status, STATUS_STARTING);
        assert_eq!(published.last().unwrap(), &snapshot);
    }

    #[tokio::test]
    async fn test_suggestion_and_utterance_share_turn_path() {
        let h = harness(ScriptedModel::new([
            GREETING,
            "Сколько килограммов?\nВарианты ответа:\n– Один\n– Два",
            "Хорошо!",
        ]));
        h.orchestrator.select_topic(market()).await.unwrap();

        h.orchestrator.submit_suggestion("Яблоки").await.unwrap();
        assert_eq!(h.orchestrator.snapshot().suggestions, vec!["Один", "Два"]);

        h.orchestrator.submit_utterance("Два, пожалуйста").await.unwrap();
        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.history.len(), 5);
        assert!(snapshot.suggestions.is_empty());
        assert_eq!(snapshot.status, STATUS_RESPONDED);
        assert_eq!(h.synthesizer.spoken().len(), 3);
    }

    #[tokio::test]
    async fn test_ended_conversation_short_circuits_submissions() {
        let h = harness(ScriptedModel::new([GREETING]));
        h.orchestrator.select_topic(market()).await.unwrap();

        for i in 0..10 {
            h.model.push_reply(format!("Ответ {}", i));
            h.orchestrator.submit_utterance("Ещё").await.unwrap();
        }
        let ended = h.orchestrator.snapshot();
        assert_eq!(ended.lifecycle, Lifecycle::Ended);
        assert_eq!(ended.status, STATUS_FINISHED);
        let turns_before = h.model.log().turns.len();

        h.model.push_reply("never sent");
        let err = h.orchestrator.submit_utterance("Ещё раз").await.unwrap_err();
        assert_eq!(err, EngineError::CapReached(20));
        let after = h.orchestrator.snapshot();
        assert_eq!(after.history, ended.history);
        assert_eq!(after.lifecycle, Lifecycle::Ended);
        assert_eq!(after.status, STATUS_FINISHED);
        assert_eq!(h.model.log().turns.len(), turns_before);
    }

    #[tokio::test]
    async fn test_reset_after_cap_opens_new_conversation() {
        let model = ScriptedModel::new([GREETING]);
        let h = harness(model);
        h.orchestrator.select_topic(market()).await.unwrap();
        let first_conversation = h.orchestrator.snapshot().conversation_id;

        for i in 0..10 {
            h.model.push_reply(format!("Ответ {}", i));
            h.orchestrator.submit_utterance("Ещё").await.unwrap();
        }
        assert_eq!(h.orchestrator.lifecycle(), Lifecycle::Ended);

        h.model.push_reply("Привет снова!");
        let greeting = h.orchestrator.reset_conversation().await.unwrap();
        assert_eq!(greeting.reply, "Привет снова!");

        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.lifecycle, Lifecycle::Active);
        assert_ne!(snapshot.conversation_id, first_conversation);
        assert_eq!(h.model.log().instructions.len(), 2);
        assert_eq!(h.model.log().closed, 1);
    }

    #[tokio::test]
    async fn test_model_failure_sets_status_and_keeps_history() {
        let h = harness(ScriptedModel::new([GREETING]));
        h.orchestrator.select_topic(market()).await.unwrap();
        h.model.push_failure("quota exceeded");

        let err = h.orchestrator.submit_utterance("Яблоки").await.unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));

        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.suggestions, vec!["Яблоки", "Помидоры"]);
        assert_eq!(snapshot.status, "❌ model error: quota exceeded");
        assert!(!snapshot.busy);
        assert_eq!(h.synthesizer.spoken().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_surfaces_config_status() {
        let session = DialogueSession::new(None, EngineConfig::default());
        let orchestrator = SessionOrchestrator::new(
            session,
            SpeechOutput::new(Arc::new(RecordingSynthesizer::default())),
        );

        let err = orchestrator.select_topic(market()).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.lifecycle, Lifecycle::Uninitialized);
        assert!(snapshot.status.starts_with("❌ configuration error"));
    }

    #[tokio::test]
    async fn test_reset_without_topic_is_not_initialized() {
        let h = harness(ScriptedModel::default());
        assert_eq!(
            h.orchestrator.reset_conversation().await.unwrap_err(),
            EngineError::NotInitialized
        );
        assert!(h.model.log().instructions.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_turn_publishes_user_message() {
        let (model, gate) = ScriptedModel::gated();
        model.push_reply(GREETING);
        model.push_reply("Вот, пожалуйста.");
        let mut h = harness(model);
        gate.add_permits(1);
        h.orchestrator.select_topic(market()).await.unwrap();
        drain(&mut h.snapshots);

        let turn = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            async move { orchestrator.submit_utterance("Помидоры").await }
        });
        let sending = h.snapshots.recv().await.unwrap();
        assert_eq!(sending.status, STATUS_SENDING);
        assert!(sending.busy);
        assert_eq!(sending.history.len(), 2);
        assert!(sending.suggestions.is_empty());

        let err = h.orchestrator.submit_suggestion("Яблоки").await.unwrap_err();
        assert_eq!(err, EngineError::Busy);

        gate.add_permits(1);
        turn.await.unwrap().unwrap();
        let snapshot = h.orchestrator.snapshot();
        assert_eq!(snapshot.history.len(), 3);
        assert!(!snapshot.busy);
    }

    #[tokio::test]
    async fn test_correction_toggle_reopens_active_conversation() {
        let h = harness(ScriptedModel::new([GREETING, "Правильнее сказать: ..."]));
        assert!(h.orchestrator.set_correction_mode(false).await.unwrap().is_none());

        h.orchestrator.select_topic(market()).await.unwrap();
        let reopened = h.orchestrator.set_correction_mode(true).await.unwrap();
        assert!(reopened.is_some());

        let log = h.model.log();
        assert_eq!(log.instructions.len(), 2);
        assert!(!log.instructions[0].contains("Правильнее сказать"));
        assert!(log.instructions[1].contains("Правильнее сказать"));
        let snapshot = h.orchestrator.snapshot();
        assert!(snapshot.correction);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test]
    async fn test_correction_toggle_without_topic_only_records_flag() {
        let h = harness(ScriptedModel::default());
        assert!(h.orchestrator.set_correction_mode(true).await.unwrap().is_none());
        assert!(h.orchestrator.snapshot().correction);
        assert!(h.model.log().instructions.is_empty());
    }

    #[tokio::test]
    async fn test_capture_signals_route_to_status_or_turn() {
        let h = harness(ScriptedModel::new([GREETING, "Отлично!"]));
        h.orchestrator.select_topic(market()).await.unwrap();

        let heard = h
            .orchestrator
            .handle_capture(CaptureSignal::Hearing("Мне нужны".to_string()))
            .await
            .unwrap();
        assert!(heard.is_none());
        assert_eq!(h.orchestrator.snapshot().status, "🎙️ Мне нужны");

        h.orchestrator
            .handle_capture(CaptureSignal::NoSpeech)
            .await
            .unwrap();
        assert_eq!(h.orchestrator.snapshot().status, STATUS_NO_SPEECH);

        let err = h
            .orchestrator
            .handle_capture(CaptureSignal::Error("network".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Recognition("network".to_string()));

        let reply = h
            .orchestrator
            .handle_capture(CaptureSignal::Utterance("Мне нужны яблоки".to_string()))
            .await
            .unwrap();
        assert_eq!(reply.unwrap().reply, "Отлично!");
        assert_eq!(h.orchestrator.snapshot().history[1].content, "Мне нужны яблоки");
    }

    #[tokio::test]
    async fn test_replay_speaks_only_assistant_messages() {
        let h = harness(ScriptedModel::new([GREETING, "Вот яблоки."]));
        h.orchestrator.select_topic(market()).await.unwrap();
        h.orchestrator.submit_utterance("Яблоки").await.unwrap();

        h.orchestrator.replay(0).unwrap();
        assert_eq!(
            h.orchestrator.replay(1).unwrap_err(),
            EngineError::NoSuchMessage(1)
        );
        assert_eq!(
            h.orchestrator.replay(7).unwrap_err(),
            EngineError::NoSuchMessage(7)
        );

        let texts: Vec<String> = h.synthesizer.spoken().into_iter().map(|r| r.text).collect();
        assert_eq!(
            texts,
            vec![
                "Здравствуйте! Что будете брать?",
                "Вот яблоки.",
                "Здравствуйте! Что будете брать?"
            ]
        );
    }

    #[test]
    fn test_snapshot_serializes_for_clients() {
        let h = harness(ScriptedModel::default());
        let json = serde_json::to_value(h.orchestrator.snapshot()).unwrap();
        assert_eq!(json["lifecycle"], "uninitialized");
        assert_eq!(json["status"], STATUS_IDLE);
        assert_eq!(json["history"], serde_json::json!([]));
        assert_eq!(json["busy"], false);
    }
}
