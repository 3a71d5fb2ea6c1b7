//! Type definitions for messages moving through the dispatch queue

use std::{fmt, num::NonZeroUsize, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Correlation id of a logical send request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Arc<str>);

impl MessageId {
    /// Wrap a caller-supplied id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, lexicographically sortable id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A recipient address as understood by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A logical send request.
///
/// Messages are immutable once built: retries are expressed as a fresh
/// message carrying the remaining recipients and the next attempt number,
/// see [`Message::retry`]. The payload is shared between all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    payload: Arc<str>,
    recipients: Vec<Address>,
    charging_amount: Option<f64>,
    request_reports: bool,
    attempt: u32,
}

impl Message {
    /// Build a first-attempt message.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyRecipients`] if `recipients` is empty.
    pub fn new<I, A>(
        id: impl Into<MessageId>,
        payload: impl Into<Arc<str>>,
        recipients: I,
    ) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        let id = id.into();
        let recipients: Vec<Address> = recipients.into_iter().map(Into::into).collect();

        if recipients.is_empty() {
            return Err(DispatchError::EmptyRecipients(id));
        }

        Ok(Self {
            id,
            payload: payload.into(),
            recipients,
            charging_amount: None,
            request_reports: false,
            attempt: 0,
        })
    }

    /// Charge each recipient `amount`; non-positive amounts mean no charge.
    #[must_use]
    pub fn with_charging_amount(mut self, amount: f64) -> Self {
        self.charging_amount = (amount > 0.0).then_some(amount);
        self
    }

    /// Ask the transport for delivery reports.
    #[must_use]
    pub const fn with_delivery_reports(mut self, request_reports: bool) -> Self {
        self.request_reports = request_reports;
        self
    }

    /// The same request narrowed to `recipients`, at the same attempt.
    ///
    /// Returns `None` when `recipients` is empty, so an empty message can
    /// never be produced.
    #[must_use]
    pub fn narrowed(&self, recipients: Vec<Address>) -> Option<Self> {
        (!recipients.is_empty()).then(|| Self {
            recipients,
            ..self.header()
        })
    }

    /// The next attempt of this request for `recipients`.
    ///
    /// Returns `None` when `recipients` is empty.
    #[must_use]
    pub fn retry(&self, recipients: Vec<Address>) -> Option<Self> {
        (!recipients.is_empty()).then(|| Self {
            recipients,
            attempt: self.attempt.saturating_add(1),
            ..self.header()
        })
    }

    fn header(&self) -> Self {
        Self {
            id: self.id.clone(),
            payload: Arc::clone(&self.payload),
            recipients: Vec::new(),
            charging_amount: self.charging_amount,
            request_reports: self.request_reports,
            attempt: self.attempt,
        }
    }

    pub const fn id(&self) -> &MessageId {
        &self.id
    }

    pub const fn payload(&self) -> &Arc<str> {
        &self.payload
    }

    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    pub const fn charging_amount(&self) -> Option<f64> {
        self.charging_amount
    }

    pub const fn request_reports(&self) -> bool {
        self.request_reports
    }

    /// Number of previous attempts; zero for a fresh message.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Transport calls needed to send this message.
    pub fn call_units(&self, max_recipients_per_call: NonZeroUsize) -> usize {
        crate::partition::call_units(self.recipients.len(), max_recipients_per_call)
    }
}

/// One transport call: a batch of a message's recipients.
#[derive(Debug, Clone, Copy)]
pub struct SendRequest<'a> {
    pub message_id: &'a MessageId,
    pub payload: &'a str,
    pub recipients: &'a [Address],
    pub charging_amount: Option<f64>,
    pub request_reports: bool,
    /// Message-level attempt this call belongs to, zero for the first.
    pub attempt: u32,
}

impl<'a> SendRequest<'a> {
    pub(crate) fn for_batch(message: &'a Message, recipients: &'a [Address]) -> Self {
        Self {
            message_id: &message.id,
            payload: &message.payload,
            recipients,
            charging_amount: message.charging_amount,
            request_reports: message.request_reports,
            attempt: message.attempt,
        }
    }
}

/// Per-recipient result reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Accepted by the remote side.
    Delivered {
        /// Identifier the remote side assigned, if any.
        transport_id: Option<String>,
    },
    /// Transient condition; the recipient may be attempted again.
    RetryableFailure(String),
    /// Permanent condition; the recipient is never attempted again.
    TerminalFailure(String),
}

/// A recipient paired with its [`OutcomeStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub address: Address,
    pub status: OutcomeStatus,
}

impl RecipientOutcome {
    pub fn delivered(address: impl Into<Address>, transport_id: Option<String>) -> Self {
        Self {
            address: address.into(),
            status: OutcomeStatus::Delivered { transport_id },
        }
    }

    pub fn retryable(address: impl Into<Address>, reason: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: OutcomeStatus::RetryableFailure(reason.into()),
        }
    }

    pub fn terminal(address: impl Into<Address>, reason: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: OutcomeStatus::TerminalFailure(reason.into()),
        }
    }
}
