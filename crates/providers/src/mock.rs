//! `MockProvider`: a test double for `Provider`.
//!
//! Useful in unit and integration tests where a real model backend is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{ChatRequest, Provider, ProviderError, ProviderReply};

/// Behaviour injected into `MockProvider` at construction time.
pub enum MockBehaviour {
    /// Reply with a fixed string.
    Reply(String),
    /// Reply with a function of the last user message.
    Transform(fn(&str) -> String),
    /// Fail with the given error.
    Fail(ProviderError),
    /// Never resolve. Used to exercise cancellation and timeouts.
    Hang,
}

/// A mock provider that records every request it receives and returns a
/// programmer-specified result.
pub struct MockProvider {
    /// What the provider will do when `send_message` is called.
    pub behaviour: MockBehaviour,
    /// Reported by `is_configured`.
    pub configured: bool,
    /// All requests seen by this provider (in call order).
    pub calls: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockProvider {
    fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            configured: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always replies with `content`.
    pub fn replying(content: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::Reply(content.into()))
    }

    /// Create a mock that replies with `f(last user message)`.
    pub fn transforming(f: fn(&str) -> String) -> Self {
        Self::with_behaviour(MockBehaviour::Transform(f))
    }

    /// Create a mock that replies with the upper-cased user message.
    pub fn uppercase() -> Self {
        Self::transforming(|s| s.to_uppercase())
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_behaviour(MockBehaviour::Fail(error))
    }

    /// Create a mock whose calls never complete.
    pub fn hanging() -> Self {
        Self::with_behaviour(MockBehaviour::Hang)
    }

    /// Mark the mock as unconfigured.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Number of times this provider has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// User-message content of every call, in call order.
    pub fn received_inputs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.last_user_message().unwrap_or_default().to_owned())
            .collect()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<ProviderReply, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());

        match &self.behaviour {
            MockBehaviour::Reply(content) => Ok(ProviderReply::new(content.clone())),
            MockBehaviour::Transform(f) => {
                let input = request.last_user_message().unwrap_or_default();
                Ok(ProviderReply::new(f(input)))
            }
            MockBehaviour::Fail(err) => Err(err.clone()),
            MockBehaviour::Hang => std::future::pending().await,
        }
    }
}
