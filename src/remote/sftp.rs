//! SFTP over SSH, built on `russh` and `russh-sftp`

use async_trait::async_trait;
use russh::client::{self, AuthResult, Handle};
use russh::keys::{HashAlg, PublicKeyBase64};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::trust::{HostKeyCheck, HostTrust};
use super::{resolve_path, ByteStream, Connector, RemoteEntry, RemoteSession};
use crate::error::{SyncError, SyncResult};
use crate::request::Endpoint;

const DEFAULT_PORT: u16 = 22;

/// Opens [`SftpRemote`] sessions
pub struct SftpConnector {
    trust: HostTrust,
    connect_timeout: Duration,
}

impl SftpConnector {
    pub fn new(trust: HostTrust, connect_timeout: Duration) -> Self {
        Self {
            trust,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn open(&self, endpoint: &Endpoint) -> SyncResult<Box<dyn RemoteSession>> {
        let check = HostKeyCheck::resolve(endpoint.host_key.as_deref(), &self.trust)?;
        let ssh = SshSession::connect(endpoint, check, self.connect_timeout).await?;
        let sftp = ssh.open_channel().await?;
        Ok(Box::new(sftp))
    }
}

/// Handshake callbacks: only the host key check matters here
struct HostKeyGuard {
    host: String,
    check: HostKeyCheck,
}

impl client::Handler for HostKeyGuard {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        let accepted = self
            .check
            .accepts(&server_public_key.public_key_bytes(), &fingerprint);

        match (&self.check, accepted) {
            (HostKeyCheck::AcceptAny, _) => {
                warn!(host = %self.host, %fingerprint, "accepting unverified host key")
            }
            (_, true) => debug!(host = %self.host, %fingerprint, "host key verified"),
            (_, false) => warn!(host = %self.host, %fingerprint, "host key rejected"),
        }
        Ok(accepted)
    }
}

/// An authenticated SSH connection without a channel yet
pub struct SshSession {
    handle: Handle<HostKeyGuard>,
    host: String,
}

impl SshSession {
    pub async fn connect(
        endpoint: &Endpoint,
        check: HostKeyCheck,
        connect_timeout: Duration,
    ) -> SyncResult<Self> {
        let (host, port) = split_host_port(&endpoint.host)?;
        let connect_err = |reason: String| SyncError::Connect {
            host: endpoint.host.clone(),
            reason,
        };

        let config = Arc::new(client::Config::default());
        let guard = HostKeyGuard {
            host: endpoint.host.clone(),
            check,
        };

        debug!(host = %host, port, "opening ssh connection");
        let mut handle = tokio::time::timeout(
            connect_timeout,
            client::connect(config, (host.as_str(), port), guard),
        )
        .await
        .map_err(|_| SyncError::Timeout {
            what: "ssh connect",
            after: connect_timeout,
        })?
        .map_err(|e| match e {
            russh::Error::UnknownKey => {
                connect_err("server host key rejected by trust policy".into())
            }
            other => connect_err(other.to_string()),
        })?;

        let auth_err = |reason: String| SyncError::Auth {
            user: endpoint.user.clone(),
            reason,
        };
        let res = handle
            .authenticate_password(endpoint.user.as_str(), endpoint.password.expose())
            .await
            .map_err(|e| auth_err(e.to_string()))?;
        if let AuthResult::Failure {
            remaining_methods,
            partial_success,
        } = res
        {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(auth_err(format!(
                "password rejected, remaining_methods: {remaining_methods:?}, partial_success: {partial_success}"
            )));
        }

        info!(host = %endpoint.host, user = %endpoint.user, "ssh session established");
        Ok(Self {
            handle,
            host: endpoint.host.clone(),
        })
    }

    /// Open the single SFTP channel this session will carry
    pub async fn open_channel(self) -> SyncResult<SftpRemote> {
        let started = self.start_sftp().await;
        match started {
            Ok((sftp, cwd)) => {
                debug!(host = %self.host, cwd = %cwd, "sftp channel open");
                Ok(SftpRemote {
                    ssh: self,
                    sftp,
                    cwd,
                })
            }
            Err(err) => {
                self.disconnect().await;
                Err(err)
            }
        }
    }

    async fn start_sftp(&self) -> SyncResult<(SftpSession, String)> {
        let connect_err = |reason: String| SyncError::Connect {
            host: self.host.clone(),
            reason,
        };
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        let cwd = sftp
            .canonicalize(".")
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        Ok((sftp, cwd))
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(host = %self.host, "ssh disconnect: {e}");
        }
    }
}

/// SFTP channel plus the session that carries it.
///
/// SFTP has no server-side working directory, so one is tracked here and
/// relative names are resolved against it.
pub struct SftpRemote {
    ssh: SshSession,
    sftp: SftpSession,
    cwd: String,
}

#[async_trait]
impl RemoteSession for SftpRemote {
    async fn change_directory(&mut self, path: &str) -> SyncResult<()> {
        let path_err = |reason: String| SyncError::Path {
            path: path.to_string(),
            reason,
        };
        let target = resolve_path(&self.cwd, path);
        let canonical = self
            .sftp
            .canonicalize(target)
            .await
            .map_err(|e| path_err(e.to_string()))?;
        let attrs = self
            .sftp
            .metadata(canonical.clone())
            .await
            .map_err(|e| path_err(e.to_string()))?;
        if !attrs.is_dir() {
            return Err(path_err("not a directory".into()));
        }
        info!("cd {canonical}");
        self.cwd = canonical;
        Ok(())
    }

    async fn list(&mut self, path: &str) -> SyncResult<Vec<RemoteEntry>> {
        let dir = resolve_path(&self.cwd, path);
        let entries = self.sftp.read_dir(dir.clone()).await.map_err(|e| SyncError::Path {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        let listing: Vec<RemoteEntry> = entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let attrs = entry.metadata();
                RemoteEntry {
                    name: entry.file_name(),
                    is_dir: attrs.is_dir(),
                    size: attrs.size,
                    modified: attrs.mtime,
                }
            })
            .collect();
        info!(dir = %dir, entries = listing.len(), "ls");
        Ok(listing)
    }

    async fn read_file(&mut self, name: &str) -> SyncResult<ByteStream> {
        let file = self
            .sftp
            .open(resolve_path(&self.cwd, name))
            .await
            .map_err(|e| SyncError::transfer(name, e))?;
        Ok(Box::pin(file))
    }

    async fn write_file(&mut self, name: &str, mut data: ByteStream) -> SyncResult<u64> {
        let mut file = self
            .sftp
            .create(resolve_path(&self.cwd, name))
            .await
            .map_err(|e| SyncError::transfer(name, e))?;
        let written = tokio::io::copy(&mut data, &mut file)
            .await
            .map_err(|e| SyncError::transfer(name, e))?;
        file.shutdown()
            .await
            .map_err(|e| SyncError::transfer(name, e))?;
        Ok(written)
    }

    async fn remove_file(&mut self, name: &str) -> SyncResult<()> {
        self.sftp
            .remove_file(resolve_path(&self.cwd, name))
            .await
            .map_err(|e| SyncError::transfer(name, e))
    }

    async fn close(self: Box<Self>) -> SyncResult<()> {
        let SftpRemote { ssh, sftp, .. } = *self;
        if let Err(e) = sftp.close().await {
            debug!(host = %ssh.host, "sftp close: {e}");
        }
        ssh.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| SyncError::Connect {
                host: ssh.host.clone(),
                reason: e.to_string(),
            })?;
        debug!(host = %ssh.host, "ssh session closed");
        Ok(())
    }
}

/// Split `host[:port]`, defaulting to port 22
pub fn split_host_port(host_with_port: &str) -> SyncResult<(String, u16)> {
    if host_with_port.starts_with('[') && host_with_port.ends_with(']') {
        let host = &host_with_port[1..host_with_port.len() - 1];
        return Ok((host.to_string(), DEFAULT_PORT));
    }
    match host_with_port.rsplit_once(':') {
        // bare IPv6 literals contain colons but no port
        Some((host, _)) if host.contains(':') && !host.starts_with('[') => {
            Ok((host_with_port.to_string(), DEFAULT_PORT))
        }
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| {
                SyncError::InvalidRequest(format!("invalid port in host: {host_with_port}"))
            })?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            Ok((host.to_string(), port))
        }
        None => Ok((host_with_port.to_string(), DEFAULT_PORT)),
    }
}
