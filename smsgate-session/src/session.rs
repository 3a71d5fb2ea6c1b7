use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Identifier the remote side assigned to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Correlation state for one conversation.
///
/// `data` belongs to the caller; the cache never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session<D> {
    pub id: SessionId,
    /// Address of the remote party
    pub remote_address: String,
    pub data: D,
}

impl<D> Session<D> {
    pub fn new(id: impl Into<SessionId>, remote_address: impl Into<String>, data: D) -> Self {
        Self {
            id: id.into(),
            remote_address: remote_address.into(),
            data,
        }
    }
}

impl<D: Default> Session<D> {
    /// A session with empty data, as created when a conversation opens.
    pub fn start(id: impl Into<SessionId>, remote_address: impl Into<String>) -> Self {
        Self::new(id, remote_address, D::default())
    }
}
