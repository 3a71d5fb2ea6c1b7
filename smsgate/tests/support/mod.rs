#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)] // Not every helper is used by every test binary

use std::sync::Mutex;

use async_trait::async_trait;
use smsgate::dispatch::{RecipientOutcome, SendRequest, Transport, TransportError};

/// Transport that accepts everything and remembers what it was asked to send.
#[derive(Debug, Default)]
pub struct AcceptingTransport {
    calls: Mutex<Vec<Vec<String>>>,
}

impl AcceptingTransport {
    /// Recipients of each call, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for AcceptingTransport {
    async fn send(
        &self,
        request: SendRequest<'_>,
    ) -> Result<Vec<RecipientOutcome>, TransportError> {
        self.calls.lock().unwrap().push(
            request
                .recipients
                .iter()
                .map(ToString::to_string)
                .collect(),
        );

        Ok(request
            .recipients
            .iter()
            .map(|address| RecipientOutcome::delivered(address.clone(), None))
            .collect())
    }
}
