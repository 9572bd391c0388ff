//! One model-backed conversation with single-flight turns and a message cap.
//!
//! The live [`ChatHandle`] sits behind an async mutex. A turn holds an owned
//! guard on it from dispatch until its history mutation is done, and callers
//! that find it locked fail fast with [`EngineError::Busy`] instead of queuing.

use crate::config::EngineConfig;
use crate::conversation::{Conversation, Message};
use crate::error::EngineError;
use crate::llm_client::{ChatHandle, DialogueModel};
use crate::parser::{self, ParsedResponse};
use crate::topic::Topic;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

/// Content-free openers sent to make the agent speak first.
pub const FILLER_INPUTS: [&str; 4] = ["...", "—", "🔊", "👋"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Uninitialized,
    Active,
    Ended,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Uninitialized => write!(f, "Uninitialized"),
            Lifecycle::Active => write!(f, "Active"),
            Lifecycle::Ended => write!(f, "Ended"),
        }
    }
}

type SharedHandle = Arc<AsyncMutex<Box<dyn ChatHandle>>>;

struct ActiveConversation {
    id: Uuid,
    handle: SharedHandle,
    /// Set once the bootstrap greeting has been appended.
    ready: bool,
}

#[derive(Default)]
struct SessionState {
    active: Option<ActiveConversation>,
    conversation: Conversation,
}

/// Serialized access to a single model conversation.
pub struct DialogueSession {
    model: Option<Arc<dyn DialogueModel>>,
    config: EngineConfig,
    state: Mutex<SessionState>,
}

/// A dispatched user turn holding the single-flight guard.
///
/// The user message is already in history. Dropping the turn before
/// [`PendingTurn::finish`] completes rolls that message back and frees the
/// guard.
pub struct PendingTurn<'a> {
    session: &'a DialogueSession,
    conversation_id: Uuid,
    handle: OwnedMutexGuard<Box<dyn ChatHandle>>,
    text: String,
    settled: bool,
}

impl PendingTurn<'_> {
    /// Awaits the model reply and appends it, or rolls the user message back.
    pub async fn finish(mut self) -> Result<ParsedResponse, EngineError> {
        let session = self.session;
        let id = self.conversation_id;
        let result = session.call_model(&mut **self.handle, &self.text).await;

        let mut guard = session.lock_state();
        let state = &mut *guard;
        self.settled = true;
        if !state.active.as_ref().is_some_and(|a| a.id == id) {
            warn!(conversation_id = %id, "Discarding reply of a replaced conversation");
            return Err(EngineError::Superseded);
        }
        match result {
            Ok(raw) => {
                let parsed = parser::parse(&raw);
                state.conversation.push_assistant(&parsed);
                info!(
                    conversation_id = %id,
                    history_len = state.conversation.len(),
                    "Turn complete"
                );
                Ok(parsed)
            }
            Err(e) => {
                state.conversation.pop_user();
                warn!(conversation_id = %id, error = %e, "Turn failed, user message rolled back");
                Err(e)
            }
        }
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.rollback(self.conversation_id);
        }
    }
}

impl DialogueSession {
    /// `model` is `None` when no credential is configured; opening then fails
    /// with [`EngineError::Config`].
    pub fn new(model: Option<Arc<dyn DialogueModel>>, config: EngineConfig) -> Self {
        Self {
            model,
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a new model conversation for `topic`, replacing any previous one.
    ///
    /// History is cleared and the old handle invalidated before the model is
    /// contacted, so a failed open leaves the session uninitialized.
    pub async fn open(&self, topic: &Topic, correction: bool) -> Result<Uuid, EngineError> {
        let model = self.model.as_ref().ok_or_else(|| {
            EngineError::Config("no API key configured for the dialogue model".to_string())
        })?;
        self.discard();

        let instruction = self.config.prompts.instruction(topic, correction);
        let handle = model
            .open(&instruction, self.config.generation)
            .await
            .map_err(|e| EngineError::model(&e))?;

        let id = Uuid::new_v4();
        let previous = self.lock_state().active.replace(ActiveConversation {
            id,
            handle: Arc::new(AsyncMutex::new(handle)),
            ready: false,
        });
        if let Some(previous) = previous {
            close_handle(previous);
        }
        info!(conversation_id = %id, topic = %topic.id, correction, "Conversation opened");
        Ok(id)
    }

    /// Makes the agent speak first by sending a throwaway filler turn.
    ///
    /// Only the assistant reply is added to history. On an already
    /// bootstrapped conversation this returns the latest reply unchanged.
    pub async fn bootstrap(&self) -> Result<ParsedResponse, EngineError> {
        let (id, mut handle) = {
            let state = self.lock_state();
            let active = state.active.as_ref().ok_or(EngineError::NotInitialized)?;
            if active.ready {
                return Ok(latest_reply(&state.conversation));
            }
            let handle = active
                .handle
                .clone()
                .try_lock_owned()
                .map_err(|_| EngineError::Busy)?;
            (active.id, handle)
        };

        let filler = FILLER_INPUTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(FILLER_INPUTS[0]);
        let raw = self.call_model(&mut **handle, filler).await?;
        let parsed = parser::parse(&raw);

        let mut guard = self.lock_state();
        let state = &mut *guard;
        let active = state
            .active
            .as_mut()
            .filter(|a| a.id == id)
            .ok_or(EngineError::Superseded)?;
        active.ready = true;
        state.conversation.push_assistant(&parsed);
        info!(conversation_id = %id, suggestions = parsed.suggestions.len(), "Conversation bootstrapped");
        Ok(parsed)
    }

    /// Sends one user turn and appends the parsed reply.
    ///
    /// The user message is visible while the turn is in flight and removed
    /// again if the model call fails.
    pub async fn send_turn(&self, text: &str) -> Result<ParsedResponse, EngineError> {
        self.begin_turn(text)?.finish().await
    }

    /// Claims the single-flight guard and appends the user message.
    ///
    /// Fails with `EmptyInput`, `NotInitialized`, `Busy` or `CapReached`,
    /// checked in that order, without touching history.
    pub fn begin_turn(&self, text: &str) -> Result<PendingTurn<'_>, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let mut state = self.lock_state();
        let active = state
            .active
            .as_ref()
            .filter(|a| a.ready)
            .ok_or(EngineError::NotInitialized)?;
        let handle = active
            .handle
            .clone()
            .try_lock_owned()
            .map_err(|_| EngineError::Busy)?;
        let conversation_id = active.id;
        if state.conversation.len() >= self.config.max_messages {
            return Err(EngineError::CapReached(self.config.max_messages));
        }
        state.conversation.push_user(text);
        Ok(PendingTurn {
            session: self,
            conversation_id,
            handle,
            text: text.to_string(),
            settled: false,
        })
    }

    /// Drops the current conversation and clears history.
    pub fn discard(&self) {
        let previous = {
            let mut state = self.lock_state();
            state.conversation.clear();
            state.active.take()
        };
        if let Some(previous) = previous {
            info!(conversation_id = %previous.id, "Conversation discarded");
            close_handle(previous);
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let state = self.lock_state();
        match &state.active {
            Some(active) if active.ready => {
                if state.conversation.len() >= self.config.max_messages {
                    Lifecycle::Ended
                } else {
                    Lifecycle::Active
                }
            }
            _ => Lifecycle::Uninitialized,
        }
    }

    /// True while a turn or bootstrap holds the handle.
    pub fn is_busy(&self) -> bool {
        self.lock_state()
            .active
            .as_ref()
            .is_some_and(|a| a.handle.try_lock().is_err())
    }

    pub fn conversation_id(&self) -> Option<Uuid> {
        self.lock_state().active.as_ref().map(|a| a.id)
    }

    pub fn history(&self) -> Vec<Message> {
        self.lock_state().conversation.messages().to_vec()
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.lock_state().conversation.suggestions().to_vec()
    }

    pub fn message(&self, index: usize) -> Option<Message> {
        self.lock_state().conversation.messages().get(index).cloned()
    }

    async fn call_model(
        &self,
        handle: &mut dyn ChatHandle,
        text: &str,
    ) -> Result<String, EngineError> {
        let result = match self.config.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.turn(text))
                .await
                .map_err(|_| {
                    EngineError::Model(format!("model did not answer within {:?}", limit))
                })?,
            None => handle.turn(text).await,
        };
        result.map_err(|e| EngineError::model(&e))
    }

    fn rollback(&self, conversation_id: Uuid) {
        let mut state = self.lock_state();
        if state.active.as_ref().is_some_and(|a| a.id == conversation_id)
            && state.conversation.pop_user().is_some()
        {
            warn!(%conversation_id, "Abandoned turn, user message rolled back");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn latest_reply(conversation: &Conversation) -> ParsedResponse {
    ParsedResponse {
        reply: conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default(),
        suggestions: conversation.suggestions().to_vec(),
    }
}

/// Closes a replaced handle now, or leaves it to its in-flight turn.
fn close_handle(previous: ActiveConversation) {
    match previous.handle.try_lock() {
        Ok(mut handle) => handle.close(),
        Err(_) => warn!(conversation_id = %previous.id, "Replaced conversation still has a turn in flight"),
    }
}
