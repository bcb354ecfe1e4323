//! The `Provider` trait: the contract every language-model backend must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

/// Everything a provider needs to produce one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Ordered conversation, oldest first.
    pub messages: Vec<ChatMessage>,
    /// System instruction for the model.
    pub system_prompt: String,
    /// Model override; `None` lets the provider pick its default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// A request with a single user message and no sampling overrides.
    pub fn single(content: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(content)],
            system_prompt: system_prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Content of the most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// The assistant's textual reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub content: String,
}

impl ProviderReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// The core provider trait.
///
/// Implementations must be cancel-safe: the engine drops the
/// `send_message` future when a run is stopped or a node times out.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Whether this provider is ready to be called.
    fn is_configured(&self) -> bool;

    /// Send the conversation and return the assistant's reply.
    async fn send_message(&self, request: &ChatRequest) -> Result<ProviderReply, ProviderError>;
}
