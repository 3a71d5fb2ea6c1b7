//! Typed errors for the dispatch queue.
//!
//! Per-recipient failures are not errors: they travel as
//! [`OutcomeStatus`](crate::OutcomeStatus) values and surface to the caller as
//! [`DispatchEvent`](crate::DispatchEvent)s. The types here cover the two
//! remaining cases:
//! - [`DispatchError`] - a request or configuration refused up front
//! - [`TransportError`] - a transport call that did not complete at all

use thiserror::Error;

use crate::types::MessageId;

/// Errors returned synchronously by the queue.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A message must have at least one recipient.
    #[error("Message {0} has no recipients")]
    EmptyRecipients(MessageId),

    /// The queue has shut down and no longer accepts work.
    #[error("Dispatch queue is closed")]
    QueueClosed,

    /// A configuration value is out of range.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

/// A transport call that failed as a whole.
///
/// The dispatch queue treats every variant as retryable: the call is repeated
/// immediately up to `call_retries` times, after which the whole batch goes
/// through message-level retry.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the remote side.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The remote side did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The remote side answered with something unintelligible.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other call-level failure.
    #[error("Transport error: {0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => Self::Timeout(error.to_string()),
            std::io::ErrorKind::InvalidData => Self::InvalidResponse(error.to_string()),
            _ => Self::Connection(error.to_string()),
        }
    }
}
