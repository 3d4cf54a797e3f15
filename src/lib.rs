//! # s3ftps - SFTP ⇄ object store synchronization
//!
//! One invocation runs one pass in one direction:
//!
//! - **get** pulls every file of a remote SFTP directory into a bucket under
//!   `downloadPath/<name>`, leaving objects that already exist untouched.
//! - **put** pushes every object under `uploadPath/` to the remote directory
//!   of the same name, then relocates it to `sentPath/`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use s3ftps::{invoke, EngineOptions, SftpConnector, S3Store, SyncConfig, SyncEngine, WireRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::load(None)?;
//!     let engine = SyncEngine::new(
//!         Arc::new(SftpConnector::new(config.trust.clone(), config.connect_timeout())),
//!         Arc::new(S3Store::new(config.store.clone())?),
//!         EngineOptions::default(),
//!     );
//!
//!     let request: WireRequest = serde_json::from_str(r#"{
//!         "operation": "put", "host": "sftp.example.com", "user": "transfer",
//!         "password": "secret", "hostKey": "AAAAC3NzaC1lZDI1NTE5...",
//!         "uploadPath": "incoming", "sentPath": "sent", "bucket": "B"
//!     }"#)?;
//!
//!     let outcome = invoke(&engine, request, config.deadline()).await;
//!     println!("{}", outcome.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod invocation;
pub mod remote;
pub mod report;
pub mod request;
pub mod storage;

// Re-export main types for library consumers
pub use config::{StoreConfig, SyncConfig};
pub use engine::{EngineOptions, SyncEngine};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use invocation::{invoke, Invocation, Status};
pub use remote::{Connector, HostTrust, RemoteEntry, RemoteSession, SftpConnector};
pub use report::{ItemFailure, SyncReport};
pub use request::{Endpoint, Operation, Request, Secret, Transfer, WireRequest};
pub use storage::{MemoryStore, ObjectStore, S3Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
