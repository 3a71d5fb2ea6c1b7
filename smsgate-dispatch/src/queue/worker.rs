//! Per-work-item sending and outcome resolution

use std::sync::{Arc, atomic::Ordering};

use ahash::AHashMap;
use smsgate_common::{internal, outgoing};
use smsgate_tracing::traced;
use tokio::sync::OwnedSemaphorePermit;

use super::DispatchQueue;
use crate::{
    error::TransportError,
    event::{DispatchEvent, FailureReason},
    partition::partition,
    types::{Address, Message, OutcomeStatus, RecipientOutcome, SendRequest},
};

const NO_OUTCOME: &str = "transport reported no outcome for recipient";

/// A recipient that failed retryably, with the reason it gave.
type Retryable = (Address, String);

impl DispatchQueue {
    /// Send one work item and resolve every recipient in it.
    ///
    /// Delivered and terminally failed recipients are reported as soon as
    /// their batch returns. Retryable ones, including whole batches whose
    /// call failed outright, are collected and resolved together at the end.
    ///
    /// `permit` is the worker slot, if the queue caps them. It is released
    /// once the last transport call returns, before retries are pushed, so a
    /// retry waiting for buffer room never holds up the loop.
    pub(super) async fn work(&self, item: Message, permit: Option<OwnedSemaphorePermit>) {
        let mut retryable: Vec<Retryable> = Vec::new();

        for (index, batch) in partition(item.recipients(), self.shared.limits.per_call).enumerate()
        {
            match self.call(&item, batch, index).await {
                Ok(outcomes) => {
                    for (address, status) in match_outcomes(batch, outcomes) {
                        self.resolve(&item, address, status, &mut retryable);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %item.id(),
                        attempt = item.attempt(),
                        batch = index,
                        error = %e,
                        "Transport call failed, treating batch as retryable"
                    );
                    let reason = e.to_string();
                    retryable.extend(batch.iter().map(|a| (a.clone(), reason.clone())));
                }
            }
        }

        drop(permit);
        self.retry_or_fail(&item, retryable).await;
    }

    /// One transport call, repeated immediately on call-level failure.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(message_id = %item.id(), attempt = item.attempt(), batch = index, recipients = batch.len())), timing(precision = "ms"))]
    async fn call(
        &self,
        item: &Message,
        batch: &[Address],
        index: usize,
    ) -> Result<Vec<RecipientOutcome>, TransportError> {
        let call_retries = self.shared.limits.call_retries;
        let mut tries = 0u32;

        loop {
            self.shared
                .counters
                .transport_calls
                .fetch_add(1, Ordering::Relaxed);

            match self
                .shared
                .transport
                .send(SendRequest::for_batch(item, batch))
                .await
            {
                Ok(outcomes) => {
                    outgoing!(
                        level = DEBUG,
                        message_id = %item.id(),
                        batch = index,
                        outcomes = outcomes.len(),
                        "Transport call completed"
                    );
                    return Ok(outcomes);
                }
                Err(e) if tries < call_retries => {
                    tries += 1;
                    outgoing!(
                        level = DEBUG,
                        message_id = %item.id(),
                        batch = index,
                        tries,
                        error = %e,
                        "Transport call failed, repeating"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn resolve(
        &self,
        item: &Message,
        address: Address,
        status: OutcomeStatus,
        retryable: &mut Vec<Retryable>,
    ) {
        match status {
            OutcomeStatus::Delivered { transport_id } => self.notify(DispatchEvent::Delivered {
                message_id: item.id().clone(),
                payload: Arc::clone(item.payload()),
                recipient: address,
                transport_id,
            }),
            OutcomeStatus::TerminalFailure(reason) => {
                internal!(
                    level = DEBUG,
                    message_id = %item.id(),
                    recipient = %address,
                    reason = %reason,
                    "Recipient failed permanently"
                );
                self.notify(DispatchEvent::Failed {
                    message_id: item.id().clone(),
                    payload: Arc::clone(item.payload()),
                    recipient: address,
                    reason: FailureReason::Rejected(reason),
                });
            }
            OutcomeStatus::RetryableFailure(reason) => retryable.push((address, reason)),
        }
    }

    /// Push retryable recipients back as the next attempt, or give up on
    /// them once the retry ceiling is reached.
    async fn retry_or_fail(&self, item: &Message, retryable: Vec<Retryable>) {
        if retryable.is_empty() {
            return;
        }

        let max_retries = self.shared.limits.max_retries;
        if item.attempt() >= max_retries {
            tracing::warn!(
                message_id = %item.id(),
                attempts = item.attempt() + 1,
                recipients = retryable.len(),
                "Retry ceiling reached, giving up on recipients"
            );
            for (recipient, last_error) in retryable {
                self.notify(DispatchEvent::Failed {
                    message_id: item.id().clone(),
                    payload: Arc::clone(item.payload()),
                    recipient,
                    reason: FailureReason::RetriesExhausted {
                        attempts: item.attempt() + 1,
                        last_error,
                    },
                });
            }
            return;
        }

        let recipients = retryable.into_iter().map(|(address, _)| address).collect();
        let Some(next) = item.retry(recipients) else {
            return;
        };

        internal!(
            level = DEBUG,
            message_id = %next.id(),
            attempt = next.attempt(),
            recipients = next.recipients().len(),
            "Requeueing retryable recipients"
        );
        self.shared
            .counters
            .requeued
            .fetch_add(1, Ordering::Relaxed);
        self.push(next).await;
    }
}

/// Pair every address in `batch` with the outcome the transport gave it.
///
/// Order follows `batch`. Addresses without an outcome become retryable;
/// outcomes for addresses outside the batch are dropped. A recipient listed
/// twice consumes two outcomes.
fn match_outcomes(
    batch: &[Address],
    outcomes: Vec<RecipientOutcome>,
) -> Vec<(Address, OutcomeStatus)> {
    let mut by_address: AHashMap<Address, Vec<OutcomeStatus>> = AHashMap::new();
    for outcome in outcomes {
        by_address
            .entry(outcome.address)
            .or_default()
            .push(outcome.status);
    }

    let matched = batch
        .iter()
        .map(|address| {
            let status = by_address
                .get_mut(address)
                .filter(|statuses| !statuses.is_empty())
                .map_or_else(
                    || OutcomeStatus::RetryableFailure(NO_OUTCOME.to_string()),
                    |statuses| statuses.remove(0),
                );
            (address.clone(), status)
        })
        .collect();

    let unexpected: usize = by_address.values().map(Vec::len).sum();
    if unexpected > 0 {
        tracing::warn!(
            outcomes = unexpected,
            "Transport reported outcomes that match no recipient in the batch"
        );
    }

    matched
}
