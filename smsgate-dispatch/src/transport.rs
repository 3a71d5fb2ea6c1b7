//! Contract for the component that actually moves bytes

use async_trait::async_trait;

use crate::{
    error::TransportError,
    types::{RecipientOutcome, SendRequest},
};

/// Performs one remote send call for a batch of recipients.
///
/// Implementations report one [`RecipientOutcome`] per recipient in
/// `request.recipients`, classifying each failure as retryable or terminal.
/// Recipients left out of the response are treated as retryable, and
/// outcomes for addresses that were not in the batch are ignored.
///
/// A call that fails as a whole returns [`TransportError`]. Calls may run
/// concurrently.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(
        &self,
        request: SendRequest<'_>,
    ) -> Result<Vec<RecipientOutcome>, TransportError>;
}

