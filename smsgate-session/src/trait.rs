use std::sync::Arc;

use crate::session::{Session, SessionId};

/// Storage for conversation sessions.
///
/// Both operations are expected to return promptly; they may take a lock but
/// must not wait on I/O.
pub trait SessionStore<D>: Send + Sync {
    /// Look up a session, counting as a use for eviction purposes.
    ///
    /// Returns `None` when no session with `id` is held.
    fn get(&self, id: &SessionId) -> Option<Arc<Session<D>>>;

    /// Store `session`, replacing any session with the same id.
    fn save(&self, session: Session<D>);
}
