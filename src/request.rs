//! Invocation parameters
//!
//! A [`WireRequest`] is the flat record a caller hands over: every field is an
//! optional string, exactly as it arrives in JSON. [`Request`] is the validated
//! form the engine runs on. Conversion happens once, at the boundary.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// Which flow an invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Pull remote files into the object store
    Get,
    /// Push objects to the remote, then relocate them
    Put,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SyncError;

    /// Case-sensitive: only the literals `get` and `put` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Operation::Get),
            "put" => Ok(Operation::Put),
            other => Err(SyncError::InvalidRequest(format!(
                "unknown operation {other:?}"
            ))),
        }
    }
}

/// String that never shows up in `Debug` output or logs
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Flat request record as received on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireRequest {
    pub operation: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<Secret>,
    /// Standard base64 of the expected server key blob
    pub host_key: Option<String>,
    pub download_path: Option<String>,
    pub upload_path: Option<String>,
    pub sent_path: Option<String>,
    pub bucket: Option<String>,
}

/// Remote endpoint identity and credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host` or `host:port`
    pub host: String,
    pub user: String,
    pub password: Secret,
    /// Pinned server key, SSH wire format
    pub host_key: Option<Vec<u8>>,
}

/// Flow-specific parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Get {
        download_path: String,
    },
    Put {
        upload_path: String,
        sent_path: String,
    },
}

/// Validated parameters for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub endpoint: Endpoint,
    pub bucket: String,
    pub transfer: Transfer,
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self.transfer {
            Transfer::Get { .. } => Operation::Get,
            Transfer::Put { .. } => Operation::Put,
        }
    }
}

impl TryFrom<WireRequest> for Request {
    type Error = SyncError;

    fn try_from(wire: WireRequest) -> Result<Self, Self::Error> {
        let operation: Operation = required(wire.operation, "operation")?.parse()?;

        // Fields the selected flow doesn't use are ignored, not validated.
        let transfer = match operation {
            Operation::Get => Transfer::Get {
                download_path: required(wire.download_path, "downloadPath")?,
            },
            Operation::Put => Transfer::Put {
                upload_path: required(wire.upload_path, "uploadPath")?,
                sent_path: required(wire.sent_path, "sentPath")?,
            },
        };

        let host_key = match wire.host_key.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(encoded) => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| SyncError::InvalidRequest(format!("hostKey is not base64: {e}")))?,
            ),
        };

        Ok(Request {
            endpoint: Endpoint {
                host: required(wire.host, "host")?,
                user: required(wire.user, "user")?,
                password: wire.password.unwrap_or_default(),
                host_key,
            },
            bucket: required(wire.bucket, "bucket")?,
            transfer,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, SyncError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SyncError::InvalidRequest(format!("missing field {field}"))),
    }
}
