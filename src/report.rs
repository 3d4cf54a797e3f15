//! Per-invocation outcome bookkeeping

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SyncError};
use crate::request::Operation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// What happened to each item of one flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub operation: Operation,
    pub succeeded: Vec<String>,
    /// Items left alone: already in the store (get) or prefix markers (put)
    pub skipped: Vec<String>,
    pub failed: Vec<ItemFailure>,
    /// Items never attempted because the session broke mid-batch
    pub unprocessed: Vec<String>,
}

impl SyncReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            unprocessed: Vec::new(),
        }
    }

    pub fn record_success(&mut self, item: impl Into<String>) {
        self.succeeded.push(item.into());
    }

    pub fn record_skip(&mut self, item: impl Into<String>) {
        self.skipped.push(item.into());
    }

    pub fn record_failure(&mut self, item: impl Into<String>, error: &SyncError) {
        self.failed.push(ItemFailure {
            item: item.into(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    /// Every item either succeeded or was deliberately skipped
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unprocessed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} succeeded, {} skipped, {} failed, {} unprocessed",
            self.operation,
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len(),
            self.unprocessed.len()
        )
    }
}
