//! In-process stand-in for an SFTP server

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use s3ftps::remote::{resolve_path, ByteStream};
use s3ftps::{
    Connector, Endpoint, RemoteEntry, RemoteSession, Secret, SyncError, SyncResult, WireRequest,
};

#[derive(Default)]
pub struct RemoteState {
    /// Absolute path -> content
    pub files: BTreeMap<String, Vec<u8>>,
    /// Absolute directory paths
    pub dirs: BTreeSet<String>,
    pub opened: usize,
    pub closed: usize,
    /// Names passed to read_file, in order
    pub reads: Vec<String>,
    /// Absolute paths written, in order (repeats included)
    pub writes: Vec<String>,
    pub removed: Vec<String>,
    pub fail_reads: HashSet<String>,
    pub fail_writes: HashSet<String>,
    pub refuse_connections: bool,
    pub open_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeRemote {
    pub state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().dirs.insert("/".into());
        remote
    }

    pub fn mkdir(&self, path: &str) {
        self.state.lock().dirs.insert(path.to_string());
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.state.lock().files.insert(path.to_string(), content.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub fn writes_of(&self, path: &str) -> usize {
        self.state.lock().writes.iter().filter(|w| *w == path).count()
    }
}

#[async_trait]
impl Connector for FakeRemote {
    async fn open(&self, endpoint: &Endpoint) -> SyncResult<Box<dyn RemoteSession>> {
        let delay = self.state.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(SyncError::Connect {
                host: endpoint.host.clone(),
                reason: "connection refused".into(),
            });
        }
        state.opened += 1;
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            cwd: "/".into(),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<RemoteState>>,
    cwd: String,
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

fn name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn change_directory(&mut self, path: &str) -> SyncResult<()> {
        let target = resolve_path(&self.cwd, path);
        if !self.state.lock().dirs.contains(&target) {
            return Err(SyncError::Path {
                path: path.to_string(),
                reason: "no such file".into(),
            });
        }
        self.cwd = target;
        Ok(())
    }

    async fn list(&mut self, path: &str) -> SyncResult<Vec<RemoteEntry>> {
        let dir = resolve_path(&self.cwd, path);
        let state = self.state.lock();
        let dirs = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent(d) == dir)
            .map(|d| RemoteEntry {
                name: name_of(d),
                is_dir: true,
                size: None,
                modified: None,
            });
        let files = state
            .files
            .iter()
            .filter(|(f, _)| parent(f) == dir)
            .map(|(f, content)| RemoteEntry {
                name: name_of(f),
                is_dir: false,
                size: Some(content.len() as u64),
                modified: None,
            });
        Ok(dirs.chain(files).collect())
    }

    async fn read_file(&mut self, name: &str) -> SyncResult<ByteStream> {
        let path = resolve_path(&self.cwd, name);
        let mut state = self.state.lock();
        state.reads.push(name.to_string());
        if state.fail_reads.contains(name) {
            return Err(SyncError::Transfer {
                name: name.to_string(),
                reason: "permission denied".into(),
            });
        }
        let content = state.files.get(&path).cloned().ok_or_else(|| SyncError::Transfer {
            name: name.to_string(),
            reason: "no such file".into(),
        })?;
        Ok(Box::pin(Cursor::new(content)))
    }

    async fn write_file(&mut self, name: &str, mut data: ByteStream) -> SyncResult<u64> {
        let path = resolve_path(&self.cwd, name);
        if self.state.lock().fail_writes.contains(name) {
            return Err(SyncError::Transfer {
                name: name.to_string(),
                reason: "disk full".into(),
            });
        }
        let mut content = Vec::new();
        data.read_to_end(&mut content)
            .await
            .map_err(|e| SyncError::Transfer {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let len = content.len() as u64;
        let mut state = self.state.lock();
        state.writes.push(path.clone());
        state.files.insert(path, content);
        Ok(len)
    }

    async fn remove_file(&mut self, name: &str) -> SyncResult<()> {
        let path = resolve_path(&self.cwd, name);
        let mut state = self.state.lock();
        state.files.remove(&path);
        state.removed.push(path);
        Ok(())
    }

    async fn close(self: Box<Self>) -> SyncResult<()> {
        self.state.lock().closed += 1;
        Ok(())
    }
}

pub fn get_request(download_path: &str) -> WireRequest {
    WireRequest {
        operation: Some("get".into()),
        host: Some("sftp.example.com".into()),
        user: Some("transfer".into()),
        password: Some(Secret::new("hunter2")),
        download_path: Some(download_path.into()),
        bucket: Some("B".into()),
        ..WireRequest::default()
    }
}

pub fn put_request(upload_path: &str, sent_path: &str) -> WireRequest {
    WireRequest {
        operation: Some("put".into()),
        host: Some("sftp.example.com".into()),
        user: Some("transfer".into()),
        password: Some(Secret::new("hunter2")),
        upload_path: Some(upload_path.into()),
        sent_path: Some(sent_path.into()),
        bucket: Some("B".into()),
        ..WireRequest::default()
    }
}
