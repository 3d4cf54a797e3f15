//! Runtime configuration
//!
//! Settings come from an optional TOML file, then environment variables
//! (after loading `.env`) override individual values. Request-level
//! parameters never live here; they arrive with each invocation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::SyncError;
use crate::remote::HostTrust;
use crate::request::Secret;

const DEFAULT_REGION: &str = "us-east-2";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Object store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Custom endpoint (MinIO, R2, ...); AWS regional endpoint when unset
    pub endpoint: Option<String>,

    pub region: String,

    pub access_key_id: String,

    pub secret_access_key: Secret,

    /// Temporary credentials token
    pub session_token: Option<Secret>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: String::new(),
            secret_access_key: Secret::default(),
            session_token: None,
        }
    }
}

impl StoreConfig {
    /// Base URL requests are addressed to (path-style)
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub store: StoreConfig,

    /// Host key policy used when a request carries no pinned key
    pub trust: HostTrust,

    /// Bound on TCP connect plus SSH handshake
    pub connect_timeout_secs: u64,

    /// Bound on a whole invocation; unbounded when unset
    pub deadline_secs: Option<u64>,

    /// Remove remote files once they have been written to the store (get flow)
    pub delete_remote_after_get: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            trust: HostTrust::default(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            deadline_secs: None,
            delete_remote_after_get: false,
        }
    }
}

impl SyncConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Override fields from variables resolved through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup("AWS_REGION") {
            self.store.region = region;
        }
        if let Some(key) = lookup("AWS_ACCESS_KEY_ID") {
            self.store.access_key_id = key;
        }
        if let Some(secret) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.store.secret_access_key = Secret::new(secret);
        }
        if let Some(token) = lookup("AWS_SESSION_TOKEN") {
            self.store.session_token = Some(Secret::new(token));
        }
        if let Some(endpoint) = lookup("S3FTPS_STORE_ENDPOINT") {
            self.store.endpoint = Some(endpoint);
        }
        if let Some(secs) = lookup("S3FTPS_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = parse_env("S3FTPS_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("S3FTPS_DEADLINE_SECS") {
            self.deadline_secs = Some(parse_env("S3FTPS_DEADLINE_SECS", &secs)?);
        }
        if let Some(flag) = lookup("S3FTPS_DELETE_REMOTE") {
            self.delete_remote_after_get = parse_env("S3FTPS_DELETE_REMOTE", &flag)?;
        }
        if let Some(list) = lookup("S3FTPS_HOST_FINGERPRINTS") {
            let fingerprints: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !fingerprints.is_empty() {
                self.trust = HostTrust::Fingerprints { fingerprints };
            }
        }
        if let Some(flag) = lookup("S3FTPS_INSECURE_ACCEPT_ANY_HOST_KEY") {
            if parse_env::<bool>("S3FTPS_INSECURE_ACCEPT_ANY_HOST_KEY", &flag)? {
                self.trust = HostTrust::InsecureAcceptAny;
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SyncError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{name} has an invalid value: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.store.region, "us-east-2");
        assert_eq!(config.trust, HostTrust::Reject);
        assert!(!config.delete_remote_after_get);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.deadline().is_none());
        assert_eq!(
            config.store.endpoint_url(),
            "https://s3.us-east-2.amazonaws.com"
        );
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
deadline_secs = 600
delete_remote_after_get = true

[store]
endpoint = "http://localhost:9000/"
access_key_id = "minio"
secret_access_key = "minio123"

[trust]
mode = "fingerprints"
fingerprints = ["SHA256:abc"]
"#
        )
        .unwrap();

        let config = SyncConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.deadline(), Some(Duration::from_secs(600)));
        assert!(config.delete_remote_after_get);
        assert_eq!(config.store.endpoint_url(), "http://localhost:9000");
        assert_eq!(config.store.region, "us-east-2");
        assert_eq!(config.store.secret_access_key.expose(), "minio123");
        assert_eq!(
            config.trust,
            HostTrust::Fingerprints {
                fingerprints: vec!["SHA256:abc".into()]
            }
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("S3FTPS_CONNECT_TIMEOUT_SECS", "5"),
            ("S3FTPS_HOST_FINGERPRINTS", "SHA256:one, SHA256:two"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.store.region, "eu-west-1");
        assert_eq!(config.store.access_key_id, "AKIA");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.trust,
            HostTrust::Fingerprints {
                fingerprints: vec!["SHA256:one".into(), "SHA256:two".into()]
            }
        );
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env(|name| (name == "S3FTPS_DELETE_REMOTE").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("S3FTPS_DELETE_REMOTE"));
    }
}
