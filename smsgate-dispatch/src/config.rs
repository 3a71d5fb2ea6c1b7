//! Configuration for the dispatch queue

use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::DispatchError;

const fn default_capacity() -> usize {
    1000
}

const fn default_calls_per_second() -> u32 {
    10
}

const fn default_max_recipients_per_call() -> usize {
    100
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_call_retries() -> u32 {
    2
}

const fn default_shutdown_timeout() -> u64 {
    30
}

/// Throughput, retry and buffering limits for a [`DispatchQueue`](crate::DispatchQueue).
///
/// # Examples
///
/// ```ron
/// (
///     capacity: 500,
///     calls_per_second: 4,
///     max_recipients_per_call: 100,
///     max_retries: 5,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Work items the buffer holds before `enqueue` starts waiting
    ///
    /// Default: 1000
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Transport calls admitted per one-second window
    ///
    /// Default: 10
    #[serde(default = "default_calls_per_second")]
    pub calls_per_second: u32,

    /// Most recipients the transport accepts in one call
    ///
    /// Default: 100
    #[serde(default = "default_max_recipients_per_call")]
    pub max_recipients_per_call: usize,

    /// Message-level retry ceiling
    ///
    /// A recipient that keeps failing with retryable outcomes is attempted
    /// `max_retries + 1` times before it is reported as failed.
    ///
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Immediate repeats of a transport call that failed as a whole
    ///
    /// Independent of `max_retries`; once exhausted the whole batch is handed
    /// to message-level retry.
    ///
    /// Default: 2
    #[serde(default = "default_call_retries")]
    pub call_retries: u32,

    /// Cap on concurrently running workers (omit for no cap)
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    /// How long shutdown waits for in-flight workers (in seconds)
    ///
    /// Default: 30
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            calls_per_second: default_calls_per_second(),
            max_recipients_per_call: default_max_recipients_per_call(),
            max_retries: default_max_retries(),
            call_retries: default_call_retries(),
            max_in_flight: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Validated limits the queue runs with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub capacity: usize,
    pub calls_per_second: u32,
    pub per_call: NonZeroUsize,
    /// Recipients in one work item: one second's worth of calls.
    pub per_item: NonZeroUsize,
    pub max_retries: u32,
    pub call_retries: u32,
    pub max_in_flight: Option<usize>,
    pub shutdown_timeout: Duration,
}

impl DispatchConfig {
    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DispatchError> {
        self.limits().map(|_| ())
    }

    pub(crate) fn limits(&self) -> Result<Limits, DispatchError> {
        let invalid =
            |field: &str| DispatchError::InvalidConfig(format!("{field} must be at least 1"));
        let too_large = |field: &str| {
            DispatchError::InvalidConfig(format!(
                "{field} must be at most {}",
                Semaphore::MAX_PERMITS
            ))
        };

        if self.capacity == 0 {
            return Err(invalid("capacity"));
        }
        if self.capacity > Semaphore::MAX_PERMITS {
            return Err(too_large("capacity"));
        }
        match self.max_in_flight {
            Some(0) => return Err(invalid("max_in_flight")),
            Some(n) if n > Semaphore::MAX_PERMITS => return Err(too_large("max_in_flight")),
            _ => {}
        }
        let per_call = NonZeroUsize::new(self.max_recipients_per_call)
            .ok_or_else(|| invalid("max_recipients_per_call"))?;
        let calls = NonZeroUsize::new(usize::try_from(self.calls_per_second).unwrap_or(usize::MAX))
            .ok_or_else(|| invalid("calls_per_second"))?;

        Ok(Limits {
            capacity: self.capacity,
            calls_per_second: self.calls_per_second,
            per_call,
            per_item: per_call.saturating_mul(calls),
            max_retries: self.max_retries,
            call_retries: self.call_retries,
            max_in_flight: self.max_in_flight,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        })
    }
}
