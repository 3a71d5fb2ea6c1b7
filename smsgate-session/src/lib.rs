//! Conversational session state for the smsgate gateway client
//!
//! - [`SessionCache`]: a bounded store that evicts the least recently used
//!   session once full
//! - [`SessionStore`]: the contract the cache fulfils, so callers can bring
//!   their own storage
//! - [`ConversationRouter`]: turns inbound conversation events into handler
//!   calls, creating and refreshing sessions along the way

pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod session;
pub mod r#trait;

pub use cache::SessionCache;
pub use config::SessionConfig;
pub use conversation::{
    ConversationHandler, ConversationRouter, HandlerError, Inbound, Operation, Reply, ReplyKind,
};
pub use error::SessionError;
pub use r#trait::SessionStore;
pub use session::{Session, SessionId};
