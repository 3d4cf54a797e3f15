//! Synchronization engine
//!
//! Runs one flow per request:
//!
//! - **get**: list a remote directory and copy every file into the store under
//!   `downloadPath/<name>`, skipping objects that already exist.
//! - **put**: list the store under `uploadPath/`, write each object to the
//!   remote, then move it to `sentPath/` (copy, then delete).
//!
//! Where an item lives in the store is the only record of whether it has
//! been sent. The put step is write, copy, delete with no transaction around
//! it: a failure after the write leaves the object under `uploadPath/` and it
//! is sent again on the next run. Delivery is at-least-once.
//!
//! Concurrent put runs against the same bucket and `uploadPath` can both pick
//! up a key and send it twice; nothing here guards against that.

use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::{Connector, RemoteSession};
use crate::report::SyncReport;
use crate::request::{Operation, Request, Transfer};
use crate::storage::{basename, list_by_prefix, relocated_key, ObjectStore, PutOutcome};

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Remove a remote file once it has been written to the store
    pub delete_remote_after_get: bool,
}

pub struct SyncEngine {
    connector: Arc<dyn Connector>,
    store: Arc<dyn ObjectStore>,
    options: EngineOptions,
}

/// How a single put item ended
enum PutItem {
    Sent,
    Skipped,
}

impl SyncEngine {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn ObjectStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            connector,
            store,
            options,
        }
    }

    /// Run the flow the request selects.
    ///
    /// Errors are session-level failures. Per-item failures land in the
    /// returned report instead.
    pub async fn run(&self, request: &Request) -> SyncResult<SyncReport> {
        match &request.transfer {
            Transfer::Get { download_path } => self.get_files(request, download_path).await,
            Transfer::Put {
                upload_path,
                sent_path,
            } => self.put_files(request, upload_path, sent_path).await,
        }
    }

    async fn get_files(&self, request: &Request, download_path: &str) -> SyncResult<SyncReport> {
        info!(download_path, bucket = %request.bucket, "getting files via sftp");

        let mut session = self.connector.open(&request.endpoint).await?;
        let mut report = SyncReport::new(Operation::Get);
        let outcome = self
            .pull_all(session.as_mut(), request, download_path, &mut report)
            .await;
        close_session(session).await;

        outcome?;
        info!("{}", report.summary());
        Ok(report)
    }

    async fn pull_all(
        &self,
        session: &mut dyn RemoteSession,
        request: &Request,
        download_path: &str,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        session.change_directory(download_path).await?;
        let entries = session.list(".").await?;

        let files: Vec<String> = entries
            .into_iter()
            .filter(|entry| {
                if entry.is_dir {
                    debug!(name = %entry.name, "skipping directory");
                }
                !entry.is_dir
            })
            .map(|entry| entry.name)
            .collect();

        for (idx, name) in files.iter().enumerate() {
            info!("syncing {name}");
            let key = format!("{download_path}/{name}");
            match self.pull_one(session, &request.bucket, name, &key).await {
                Ok(PutOutcome::Written) => report.record_success(name.as_str()),
                Ok(PutOutcome::AlreadyExists) => {
                    debug!(%key, "already in store");
                    report.record_skip(name.as_str());
                }
                Err(err) => {
                    warn!(file = %name, "get failed: {err}");
                    report.record_failure(name.as_str(), &err);
                    if err.kind().aborts_flow() {
                        report.unprocessed.extend(files[idx + 1..].iter().cloned());
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn pull_one(
        &self,
        session: &mut dyn RemoteSession,
        bucket: &str,
        name: &str,
        key: &str,
    ) -> SyncResult<PutOutcome> {
        let stream = session.read_file(name).await?;
        let outcome = self.store.put_object_if_absent(bucket, key, stream).await?;

        if outcome == PutOutcome::Written && self.options.delete_remote_after_get {
            match session.remove_file(name).await {
                Ok(()) => debug!(file = %name, "removed remote file"),
                Err(err) => warn!(file = %name, "could not remove remote file: {err}"),
            }
        }
        Ok(outcome)
    }

    async fn put_files(
        &self,
        request: &Request,
        upload_path: &str,
        sent_path: &str,
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(Operation::Put);

        debug!(upload_path, bucket = %request.bucket, "getting files to upload");
        let keys: Vec<String> = list_by_prefix(self.store.as_ref(), &request.bucket, upload_path)
            .try_collect()
            .await?;

        if keys.is_empty() {
            info!("no files to upload");
            return Ok(report);
        }

        info!(count = keys.len(), "putting files via sftp");
        let mut session = self.connector.open(&request.endpoint).await?;
        let outcome = self
            .push_all(session.as_mut(), request, &keys, upload_path, sent_path, &mut report)
            .await;
        close_session(session).await;

        outcome?;
        info!("{}", report.summary());
        Ok(report)
    }

    async fn push_all(
        &self,
        session: &mut dyn RemoteSession,
        request: &Request,
        keys: &[String],
        upload_path: &str,
        sent_path: &str,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        session.change_directory(upload_path).await?;

        for (idx, key) in keys.iter().enumerate() {
            debug!("found object with key {key}");
            match self
                .push_one(session, &request.bucket, key, upload_path, sent_path)
                .await
            {
                Ok(PutItem::Sent) => report.record_success(key.as_str()),
                Ok(PutItem::Skipped) => {
                    debug!(%key, "skipping prefix marker");
                    report.record_skip(key.as_str());
                }
                Err(err) => {
                    warn!(%key, "put failed: {err}");
                    report.record_failure(key.as_str(), &err);
                    if err.kind().aborts_flow() {
                        report.unprocessed.extend(keys[idx + 1..].iter().cloned());
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Write one object to the remote, then move it under `sent_path`.
    ///
    /// Restarting from the top after a failure at any step is safe; the worst
    /// case is a second remote write.
    async fn push_one(
        &self,
        session: &mut dyn RemoteSession,
        bucket: &str,
        key: &str,
        upload_path: &str,
        sent_path: &str,
    ) -> SyncResult<PutItem> {
        let file_name = basename(key);
        // Some stores list the prefix itself as an object
        if file_name.is_empty() || file_name == upload_path {
            return Ok(PutItem::Skipped);
        }
        let sent_key = relocated_key(
            key,
            upload_path.trim_end_matches('/'),
            sent_path.trim_end_matches('/'),
        )
        .ok_or_else(|| SyncError::store("relocate", key, format!("not under {upload_path}")))?;

        let data = self.store.get_object(bucket, key).await?;
        info!("uploading {file_name}");
        let written = session.write_file(file_name, data).await?;
        debug!(bytes = written, "moving {key} to {sent_key}");

        self.store.copy_object(bucket, key, &sent_key).await?;
        self.store.delete_object(bucket, key).await?;
        Ok(PutItem::Sent)
    }
}

async fn close_session(session: Box<dyn RemoteSession>) {
    if let Err(err) = session.close().await {
        warn!("closing remote session: {err}");
    }
}
