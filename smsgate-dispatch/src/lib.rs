//! Outbound dispatch for large recipient lists
//!
//! This crate provides:
//! - An order-preserving address partitioner
//! - A bounded dispatch queue throttled to a transport-call budget per second
//! - Message-level retry of transient per-recipient failures, with a ceiling
//! - One terminal [`DispatchEvent`] per recipient
//!
//! The remote call itself is delegated to a [`Transport`].

mod config;
mod error;
mod event;
pub mod partition;
mod queue;
mod transport;
mod types;

pub use config::DispatchConfig;
pub use error::{DispatchError, TransportError};
pub use event::{DispatchEvent, DispatchObserver, FailureReason};
pub use queue::{DispatchQueue, QueueStats};
pub use transport::Transport;
pub use types::{Address, Message, MessageId, OutcomeStatus, RecipientOutcome, SendRequest};
