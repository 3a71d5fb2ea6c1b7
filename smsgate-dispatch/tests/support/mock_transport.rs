//! Scriptable in-memory transport
//!
//! Decides each recipient's outcome from the address and the attempt number,
//! optionally fails whole calls, and records every call it receives.
//!
//! ```rust,ignore
//! let transport = MockTransport::builder()
//!     .retryable(["tel:94770000001"])
//!     .recover_at_attempt(1)
//!     .terminal(["tel:94770000002"])
//!     .build();
//! ```

use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use smsgate_dispatch::{Address, RecipientOutcome, SendRequest, Transport, TransportError};
use tokio::time::Instant;

/// A call the transport received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: Instant,
    pub message_id: String,
    pub attempt: u32,
    pub recipients: Vec<Address>,
    pub failed: bool,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    retryable: HashSet<String>,
    terminal: HashSet<String>,
    omitted: HashSet<String>,
    recover_at_attempt: Option<u32>,
    failing_calls: AtomicUsize,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    inner: MockTransport,
}

impl MockTransportBuilder {
    /// Report these recipients as retryable failures.
    pub fn retryable<I: IntoIterator<Item = S>, S: Into<String>>(mut self, addresses: I) -> Self {
        self.inner
            .retryable
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Report these recipients as terminal failures.
    pub fn terminal<I: IntoIterator<Item = S>, S: Into<String>>(mut self, addresses: I) -> Self {
        self.inner
            .terminal
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Leave these recipients out of the response entirely.
    pub fn omit<I: IntoIterator<Item = S>, S: Into<String>>(mut self, addresses: I) -> Self {
        self.inner.omitted.extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Deliver retryable and omitted recipients from this attempt on.
    pub fn recover_at_attempt(mut self, attempt: u32) -> Self {
        self.inner.recover_at_attempt = Some(attempt);
        self
    }

    /// Fail the first `calls` calls outright.
    pub fn fail_first_calls(self, calls: usize) -> Self {
        self.inner.failing_calls.store(calls, Ordering::SeqCst);
        self
    }

    /// Fail every call outright.
    pub fn fail_every_call(self) -> Self {
        self.fail_first_calls(usize::MAX)
    }

    /// Take this long to answer each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inner.delay = Some(delay);
        self
    }

    pub fn build(self) -> MockTransport {
        self.inner
    }
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Delivers everything.
    pub fn delivering() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls that returned per-recipient outcomes.
    pub fn completed_calls(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| !c.failed).collect()
    }

    fn recovered(&self, attempt: u32) -> bool {
        self.recover_at_attempt.is_some_and(|at| attempt >= at)
    }

    fn take_failure(&self) -> bool {
        self.failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: SendRequest<'_>,
    ) -> Result<Vec<RecipientOutcome>, TransportError> {
        let failed = self.take_failure();

        self.calls.lock().push(RecordedCall {
            at: Instant::now(),
            message_id: request.message_id.to_string(),
            attempt: request.attempt,
            recipients: request.recipients.to_vec(),
            failed,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if failed {
            return Err(TransportError::Connection("connection refused".to_string()));
        }

        let recovered = self.recovered(request.attempt);
        let outcomes = request
            .recipients
            .iter()
            .filter(|address| recovered || !self.omitted.contains(address.as_str()))
            .map(|address| {
                if self.terminal.contains(address.as_str()) {
                    RecipientOutcome::terminal(address.clone(), "E1342 MSISDN black listed")
                } else if !recovered && self.retryable.contains(address.as_str()) {
                    RecipientOutcome::retryable(address.clone(), "E1603 temporary system error")
                } else {
                    RecipientOutcome::delivered(
                        address.clone(),
                        Some(format!("{}:{address}", request.message_id)),
                    )
                }
            })
            .collect();

        Ok(outcomes)
    }
}
