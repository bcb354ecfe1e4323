//! `providers` crate holds the `Provider` capability trait and the built-in
//! provider implementations.
//!
//! An agent node never talks to a vendor API directly. The engine looks up a
//! [`Provider`] by identifier (`"claude"`, `"gpt"`, ...) and hands it a
//! [`ChatRequest`]. Real HTTP-backed providers live outside this workspace;
//! the crate ships an offline [`EchoProvider`] and a recording [`MockProvider`].

pub mod echo;
pub mod error;
pub mod mock;
pub mod traits;

pub use echo::EchoProvider;
pub use error::ProviderError;
pub use mock::MockProvider;
pub use traits::{ChatMessage, ChatRequest, Provider, ProviderReply, Role};
