//! Routing of inbound conversation turns
//!
//! An interactive conversation (a USSD menu, say) arrives one turn at a
//! time. The first turn opens a session; every later turn names it. The
//! router keeps the session's data in a [`SessionStore`] between turns and
//! hands it, mutable, to a [`ConversationHandler`] that produces the reply.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smsgate_common::incoming;
use smsgate_tracing::traced;

use crate::{
    error::SessionError,
    r#trait::SessionStore,
    session::{Session, SessionId},
};

/// Error a handler may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Whether a turn opens a conversation or continues one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Initiate,
    Continue,
}

/// One turn sent by the remote party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub session_id: SessionId,
    pub source_address: String,
    pub operation: Operation,
    pub message: String,
}

/// Whether the remote party may answer a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplyKind {
    /// The conversation stays open for another turn.
    Continue,
    /// The conversation ends with this reply.
    Final,
}

/// The handler's answer to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: String,
    pub kind: ReplyKind,
}

impl Reply {
    /// A reply that expects an answer.
    pub fn prompt(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ReplyKind::Continue,
        }
    }

    /// A reply that ends the conversation.
    pub fn end(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ReplyKind::Final,
        }
    }
}

/// Produces the reply to a conversation turn.
///
/// `data` is the session's state, which the handler may change freely; the
/// router stores the result once the handler returns successfully.
#[async_trait]
pub trait ConversationHandler<D>: Send + Sync {
    async fn handle(
        &self,
        address: &str,
        message: &str,
        operation: Operation,
        data: &mut D,
    ) -> Result<Reply, HandlerError>;
}

/// Connects inbound turns with their sessions and a handler.
pub struct ConversationRouter<D> {
    store: Arc<dyn SessionStore<D>>,
    handler: Arc<dyn ConversationHandler<D>>,
}

impl<D> Clone for ConversationRouter<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<D> fmt::Debug for ConversationRouter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationRouter").finish_non_exhaustive()
    }
}

impl<D> ConversationRouter<D>
where
    D: Clone + Default + Send + Sync,
{
    pub fn new(
        store: Arc<dyn SessionStore<D>>,
        handler: Arc<dyn ConversationHandler<D>>,
    ) -> Self {
        Self { store, handler }
    }

    /// Handle one inbound turn and return the handler's reply.
    ///
    /// An [`Operation::Initiate`] turn opens a fresh session, replacing any
    /// held under the same id. An [`Operation::Continue`] turn picks up the
    /// stored session. Either way the handler's changes to the session data
    /// are saved before the reply is returned, which also marks the session
    /// as recently used. If the handler fails, the session keeps the data it
    /// had before the turn.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownSession`] if a continuation names a session
    ///   that is not held
    /// - [`SessionError::Handler`] if the handler fails
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(session_id = %inbound.session_id, operation = ?inbound.operation)), timing(precision = "us"))]
    pub async fn handle(&self, inbound: Inbound) -> Result<Reply, SessionError> {
        incoming!(
            level = DEBUG,
            session_id = %inbound.session_id,
            source = %inbound.source_address,
            operation = ?inbound.operation,
            "Conversation turn received"
        );

        let session = match inbound.operation {
            Operation::Initiate => {
                let session =
                    Session::<D>::start(inbound.session_id.clone(), inbound.source_address);
                self.store.save(session.clone());
                session
            }
            Operation::Continue => self
                .store
                .get(&inbound.session_id)
                .map(Arc::unwrap_or_clone)
                .ok_or_else(|| SessionError::UnknownSession(inbound.session_id.clone()))?,
        };

        let mut data = session.data.clone();
        let reply = self
            .handler
            .handle(
                &session.remote_address,
                &inbound.message,
                inbound.operation,
                &mut data,
            )
            .await
            .map_err(|source| SessionError::Handler {
                session_id: inbound.session_id,
                source,
            })?;

        self.store.save(Session { data, ..session });

        Ok(reply)
    }
}
