//! Remote file endpoint
//!
//! The engine only talks to the remote side through [`Connector`] and
//! [`RemoteSession`]. [`sftp`] provides the SSH/SFTP implementation.

pub mod sftp;
pub mod trust;

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::error::SyncResult;
use crate::request::Endpoint;

pub use sftp::SftpConnector;
pub use trust::{HostKeyCheck, HostTrust};

/// Readable body handed between the remote endpoint and the object store
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub modified: Option<u32>,
}

/// Opens authenticated sessions with one file-transfer channel each
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &Endpoint) -> SyncResult<Box<dyn RemoteSession>>;
}

/// An open session on the remote endpoint.
///
/// Relative names resolve against the directory set by
/// [`change_directory`](RemoteSession::change_directory). Callers must
/// finish with [`close`](RemoteSession::close) on every path.
#[async_trait]
pub trait RemoteSession: Send {
    async fn change_directory(&mut self, path: &str) -> SyncResult<()>;

    async fn list(&mut self, path: &str) -> SyncResult<Vec<RemoteEntry>>;

    async fn read_file(&mut self, name: &str) -> SyncResult<ByteStream>;

    /// Create or truncate `name` and copy `data` into it. Returns bytes written.
    async fn write_file(&mut self, name: &str, data: ByteStream) -> SyncResult<u64>;

    async fn remove_file(&mut self, name: &str) -> SyncResult<()>;

    /// Release the channel, then the session
    async fn close(self: Box<Self>) -> SyncResult<()>;
}

/// Resolve `name` against the working directory `cwd`
pub fn resolve_path(cwd: &str, name: &str) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    if name.is_empty() || name == "." {
        return cwd.to_string();
    }
    let base = cwd.trim_end_matches('/');
    format!("{base}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("/home/transfer", "a.txt"), "/home/transfer/a.txt");
        assert_eq!(resolve_path("/home/transfer/", "incoming"), "/home/transfer/incoming");
        assert_eq!(resolve_path("/", "drop"), "/drop");
        assert_eq!(resolve_path("/home/transfer", "/drop"), "/drop");
        assert_eq!(resolve_path("/drop", "."), "/drop");
    }
}
