//! `EchoProvider`: an offline provider that replies with the user's message.
//!
//! Used by the CLI for dry runs, so a workflow can be exercised end to end
//! without network access or credentials.

use async_trait::async_trait;
use tracing::debug;

use crate::{ChatRequest, Provider, ProviderError, ProviderReply};

#[derive(Debug, Clone, Default)]
pub struct EchoProvider {
    /// Prepended to every reply, e.g. `"[claude] "`.
    prefix: String,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn is_configured(&self) -> bool {
        true
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<ProviderReply, ProviderError> {
        let content = request.last_user_message().ok_or_else(|| {
            ProviderError::InvalidResponse("conversation has no user message".into())
        })?;
        debug!(chars = content.len(), "echoing user message");
        Ok(ProviderReply::new(format!("{}{}", self.prefix, content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;

    #[tokio::test]
    async fn echoes_last_user_message_with_prefix() {
        let provider = EchoProvider::with_prefix("[gpt] ");
        let reply = provider
            .send_message(&ChatRequest::single("ping", "be brief"))
            .await
            .unwrap();
        assert_eq!(reply.content, "[gpt] ping");
    }

    #[tokio::test]
    async fn empty_conversation_is_an_error() {
        let request = ChatRequest {
            messages: vec![ChatMessage::assistant("only me")],
            ..ChatRequest::single("", "")
        };
        let err = EchoProvider::new().send_message(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
