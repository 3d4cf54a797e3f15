//! Host key trust policy

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Configured fallback for requests that don't pin a host key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostTrust {
    /// Refuse to connect without a pinned key
    #[default]
    Reject,

    /// Accept servers whose key matches one of these entries, either an
    /// OpenSSH `SHA256:` fingerprint or a base64 key blob
    Fingerprints { fingerprints: Vec<String> },

    /// Accept any server key. Test setups only.
    InsecureAcceptAny,
}

/// Check applied to the key a server presents during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyCheck {
    Pinned(Vec<u8>),
    Fingerprints(Vec<String>),
    AcceptAny,
}

impl HostKeyCheck {
    /// A key pinned on the request wins over the configured policy.
    pub fn resolve(pinned: Option<&[u8]>, fallback: &HostTrust) -> SyncResult<Self> {
        if let Some(key) = pinned {
            return Ok(HostKeyCheck::Pinned(key.to_vec()));
        }
        match fallback {
            HostTrust::Reject => Err(SyncError::Config(
                "no host key pinned on the request and no trust policy configured".into(),
            )),
            HostTrust::Fingerprints { fingerprints } if fingerprints.is_empty() => Err(
                SyncError::Config("fingerprint trust policy has no entries".into()),
            ),
            HostTrust::Fingerprints { fingerprints } => {
                Ok(HostKeyCheck::Fingerprints(fingerprints.clone()))
            }
            HostTrust::InsecureAcceptAny => Ok(HostKeyCheck::AcceptAny),
        }
    }

    /// `key_blob` is the SSH wire encoding of the server key, `fingerprint`
    /// its OpenSSH SHA-256 rendering.
    pub fn accepts(&self, key_blob: &[u8], fingerprint: &str) -> bool {
        match self {
            HostKeyCheck::Pinned(expected) => expected.as_slice() == key_blob,
            HostKeyCheck::Fingerprints(allowed) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(key_blob);
                allowed.iter().any(|a| a == fingerprint || *a == encoded)
            }
            HostKeyCheck::AcceptAny => true,
        }
    }
}
