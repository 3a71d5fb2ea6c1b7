use thiserror::Error;

use crate::{conversation::HandlerError, session::SessionId};

#[derive(Debug, Error)]
pub enum SessionError {
    /// A continuation arrived for a session that was never started or has
    /// since been evicted.
    #[error("No session with id {0}")]
    UnknownSession(SessionId),

    /// The conversation handler could not produce a reply.
    #[error("Conversation handler failed for session {session_id}: {source}")]
    Handler {
        session_id: SessionId,
        #[source]
        source: HandlerError,
    },

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}
