//! Client seam for the generative dialogue model.
//!
//! A conversation with the model is an owned [`ChatHandle`] created by
//! [`DialogueModel::open`]. The handle keeps the model-side context and is
//! dropped, never reused, when the conversation is reset.

use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::debug;

/// Sampling parameters fixed for every conversation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// Opens conversations with a model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DialogueModel: Send + Sync {
    /// Creates a fresh model-side conversation seeded with `instruction`.
    async fn open(&self, instruction: &str, config: GenerationConfig)
    -> Result<Box<dyn ChatHandle>>;
}

/// One live model-side conversation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatHandle: Send {
    /// Sends one user turn and returns the raw assistant text.
    ///
    /// A failed turn leaves the handle's context as it was before the call.
    async fn turn(&mut self, user_text: &str) -> Result<String>;

    /// Releases the model-side context. Further turns are undefined.
    fn close(&mut self);
}

/// A [`DialogueModel`] for any OpenAI-compatible chat completions API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the service.
    /// * `model` - Model identifier used for chat completions (e.g., "gemini-2.5-flash").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl DialogueModel for OpenAICompatibleClient {
    async fn open(
        &self,
        instruction: &str,
        config: GenerationConfig,
    ) -> Result<Box<dyn ChatHandle>> {
        Ok(Box::new(self.handle(instruction, config)?))
    }
}

impl OpenAICompatibleClient {
    fn handle(&self, instruction: &str, config: GenerationConfig) -> Result<OpenAIChatHandle> {
        let system: ChatCompletionRequestMessage = ChatCompletionRequestSystemMessageArgs::default()
            .content(instruction)
            .build()?
            .into();
        Ok(OpenAIChatHandle {
            client: self.client.clone(),
            model: self.model.clone(),
            config,
            messages: vec![system],
        })
    }
}

/// Conversation context kept client-side and resent on every turn.
struct OpenAIChatHandle {
    client: Client<OpenAIConfig>,
    model: String,
    config: GenerationConfig,
    messages: Vec<ChatCompletionRequestMessage>,
}

impl OpenAIChatHandle {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(self.config.max_output_tokens)
            .temperature(self.config.temperature)
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Chat completion request failed")?;

        response
            .choices
            .first()
            .context("No response choice from model")?
            .message
            .content
            .clone()
            .context("No content in model response")
    }
}

#[async_trait]
impl ChatHandle for OpenAIChatHandle {
    async fn turn(&mut self, user_text: &str) -> Result<String> {
        let user: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(user_text)
            .build()?
            .into();

        // Context grows only once the reply is in hand; a dropped turn leaves nothing.
        let request = self
            .messages
            .iter()
            .cloned()
            .chain(std::iter::once(user.clone()))
            .collect();
        let text = self.complete(request).await?;

        let assistant: ChatCompletionRequestMessage = ChatCompletionRequestAssistantMessageArgs::default()
            .content(text.clone())
            .build()?
            .into();
        self.messages.extend([user, assistant]);
        debug!(context_len = self.messages.len(), "Model turn complete");
        Ok(text)
    }

    fn close(&mut self) {
        self.messages.clear();
    }
}

/// What a [`ScriptedModel`] has been asked to do, for assertions.
#[derive(Debug, Default, Clone)]
pub struct ScriptLog {
    pub instructions: Vec<String>,
    pub turns: Vec<String>,
    pub closed: usize,
}

/// An offline [`DialogueModel`] answering from a fixed queue of replies.
///
/// Each queued entry is either a reply text or an error message. When the
/// queue runs dry every turn fails. A gated model holds each turn until a
/// permit is added to the gate, which lets callers observe in-flight turns.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    log: Arc<Mutex<ScriptLog>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::default();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    /// Returns a model whose turns wait on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let model = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (model, gate)
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.lock_replies().push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock_replies().push_back(Err(message.into()));
    }

    pub fn log(&self) -> ScriptLog {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, f: impl FnOnce(&mut ScriptLog)) {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut log);
    }
}

#[async_trait]
impl DialogueModel for ScriptedModel {
    async fn open(
        &self,
        instruction: &str,
        _config: GenerationConfig,
    ) -> Result<Box<dyn ChatHandle>> {
        self.record(|log| log.instructions.push(instruction.to_string()));
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ChatHandle for ScriptedModel {
    async fn turn(&mut self, user_text: &str) -> Result<String> {
        self.record(|log| log.turns.push(user_text.to_string()));
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        match self.lock_replies().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("Scripted model has no reply left")),
        }
    }

    fn close(&mut self) {
        self.record(|log| log.closed += 1);
    }
}
