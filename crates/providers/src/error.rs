//! Provider-level error type.

use thiserror::Error;

/// Errors returned by a provider's `send_message` method.
///
/// The engine performs no retries: every variant is fatal to the node that
/// triggered it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The upstream API rejected the credentials.
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    /// Transport or API-level failure (network, quota, 5xx, ...).
    #[error("provider request failed: {0}")]
    Request(String),

    /// The reply could not be understood.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
