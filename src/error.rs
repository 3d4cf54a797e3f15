//! Error taxonomy for synchronization runs
//!
//! Every failure the engine can observe is a [`SyncError`]. Each variant maps
//! onto an [`ErrorKind`], which decides whether the failure ends the whole flow
//! or only the item being processed.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the crate
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The wire request could not be turned into a [`crate::Request`]
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Local configuration is unusable (missing credentials, no trust policy, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport or handshake failure, including host key rejection
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    /// Credentials rejected by the remote endpoint
    #[error("authentication as {user} failed: {reason}")]
    Auth { user: String, reason: String },

    /// Remote directory missing or inaccessible
    #[error("remote path {path}: {reason}")]
    Path { path: String, reason: String },

    /// Read or write failure on an open channel
    #[error("transfer of {name} failed: {reason}")]
    Transfer { name: String, reason: String },

    /// Listing/get/put/copy/delete failure against the object store
    #[error("object store {op} on {key} failed: {reason}")]
    Store {
        op: &'static str,
        key: String,
        reason: String,
    },

    /// Object vanished between list and get
    #[error("object {key} not found")]
    NotFound { key: String },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::Connect { .. } => ErrorKind::Connect,
            SyncError::Auth { .. } => ErrorKind::Auth,
            SyncError::Path { .. } => ErrorKind::Path,
            SyncError::Transfer { .. } => ErrorKind::Transfer,
            SyncError::Store { .. } => ErrorKind::Store,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub(crate) fn transfer(name: &str, reason: impl ToString) -> Self {
        SyncError::Transfer {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn store(op: &'static str, key: &str, reason: impl ToString) -> Self {
        SyncError::Store {
            op,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Coarse category of a [`SyncError`], carried into reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Config,
    Connect,
    Auth,
    Path,
    Transfer,
    Store,
    NotFound,
    Timeout,
}

impl ErrorKind {
    /// Whether an error of this kind ends the flow instead of a single item
    pub fn aborts_flow(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest
                | ErrorKind::Config
                | ErrorKind::Connect
                | ErrorKind::Auth
                | ErrorKind::Path
                | ErrorKind::Timeout
        )
    }
}
