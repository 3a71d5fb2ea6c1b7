//! Terminal outcomes reported back to the caller
//!
//! Every recipient of an enqueued message ends in exactly one event:
//! [`DispatchEvent::Delivered`] or [`DispatchEvent::Failed`]. Events are
//! emitted from worker tasks as outcomes become known, so there is no
//! ordering between recipients or between messages.

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;

use crate::types::{Address, MessageId};

/// Why a recipient will not be attempted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The transport reported a permanent condition.
    Rejected(String),
    /// Retryable failures persisted past the retry ceiling.
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Reason given on the final attempt.
        last_error: String,
    },
    /// The queue shut down before the recipient could be attempted.
    ShuttingDown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {attempts} attempts: {last_error}"),
            Self::ShuttingDown => f.write_str("dispatch queue shut down"),
        }
    }
}

/// Terminal outcome for one recipient of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Delivered {
        message_id: MessageId,
        payload: Arc<str>,
        recipient: Address,
        /// Identifier the transport assigned, if any.
        transport_id: Option<String>,
    },
    Failed {
        message_id: MessageId,
        payload: Arc<str>,
        recipient: Address,
        reason: FailureReason,
    },
}

impl DispatchEvent {
    pub const fn message_id(&self) -> &MessageId {
        match self {
            Self::Delivered { message_id, .. } | Self::Failed { message_id, .. } => message_id,
        }
    }

    pub const fn recipient(&self) -> &Address {
        match self {
            Self::Delivered { recipient, .. } | Self::Failed { recipient, .. } => recipient,
        }
    }

    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Receives terminal outcomes.
///
/// Called from worker tasks; implementations must not block for long.
pub trait DispatchObserver: Send + Sync {
    fn notify(&self, event: DispatchEvent);
}

impl<F> DispatchObserver for F
where
    F: Fn(DispatchEvent) + Send + Sync,
{
    fn notify(&self, event: DispatchEvent) {
        self(event);
    }
}

/// Forward events into a channel, giving the caller a single event stream.
///
/// Events are dropped once the receiving half is gone.
impl DispatchObserver for mpsc::UnboundedSender<DispatchEvent> {
    fn notify(&self, event: DispatchEvent) {
        if let Err(mpsc::error::SendError(event)) = self.send(event) {
            tracing::debug!(
                message_id = %event.message_id(),
                recipient = %event.recipient(),
                "Event receiver dropped, discarding outcome"
            );
        }
    }
}
