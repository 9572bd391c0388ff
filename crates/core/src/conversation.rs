//! Visible conversation history and the suggestion set derived from it.

use crate::parser::ParsedResponse;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One visible line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only history plus the suggestions of the latest assistant reply.
///
/// Suggestions are only visible while the last message is from the assistant,
/// so rolling back a user message brings the previous chips back.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    last_suggestions: Vec<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Suggestions for the latest assistant message, empty otherwise.
    pub fn suggestions(&self) -> &[String] {
        match self.messages.last() {
            Some(msg) if msg.role == Role::Assistant => &self.last_suggestions,
            _ => &[],
        }
    }

    pub fn push_user(&mut self, text: &str) {
        self.messages.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, parsed: &ParsedResponse) {
        self.messages.push(Message::assistant(parsed.reply.clone()));
        self.last_suggestions = parsed.suggestions.clone();
    }

    /// Removes the trailing user message, if the conversation ends with one.
    pub fn pop_user(&mut self) -> Option<Message> {
        match self.messages.last() {
            Some(msg) if msg.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_suggestions.clear();
    }
}
