//! Invocation boundary
//!
//! [`invoke`] takes a raw wire request and always comes back with an
//! [`Invocation`]; nothing is propagated past this point. Each invocation gets
//! its own id and tracing span so every event of one run can be correlated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::engine::SyncEngine;
use crate::error::{ErrorKind, SyncError};
use crate::report::SyncReport;
use crate::request::{Operation, Request, WireRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Every item synced or was deliberately skipped
    Success,
    /// The flow ran but some items failed
    PartialFailure,
    /// The flow could not run or was aborted
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::PartialFailure => "PartialFailure",
            Status::Failed => "Failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub id: Uuid,
    pub operation: Option<Operation>,
    pub status: Status,
    pub report: Option<SyncReport>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl Invocation {
    fn failed(id: Uuid, operation: Option<Operation>, err: &SyncError) -> Self {
        Self {
            id,
            operation,
            status: Status::Failed,
            report: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }
}

/// Run one synchronization pass for `wire`, bounded by `deadline` if given
pub async fn invoke(
    engine: &SyncEngine,
    wire: WireRequest,
    deadline: Option<Duration>,
) -> Invocation {
    let id = Uuid::new_v4();
    let span = info_span!("invocation", %id, operation = tracing::field::Empty);

    async {
        let request = match Request::try_from(wire) {
            Ok(request) => request,
            Err(err) => {
                error!("rejecting request: {err}");
                return Invocation::failed(id, None, &err);
            }
        };
        let operation = request.operation();
        tracing::Span::current().record("operation", operation.as_str());
        info!(host = %request.endpoint.host, bucket = %request.bucket, "starting");

        let result = match deadline {
            Some(limit) => tokio::time::timeout(limit, engine.run(&request))
                .await
                .unwrap_or_else(|_| {
                    Err(SyncError::Timeout {
                        what: "invocation",
                        after: limit,
                    })
                }),
            None => engine.run(&request).await,
        };

        match result {
            Ok(report) => {
                let status = if report.is_clean() {
                    Status::Success
                } else {
                    Status::PartialFailure
                };
                info!(%status, "{}", report.summary());
                Invocation {
                    id,
                    operation: Some(operation),
                    status,
                    report: Some(report),
                    error: None,
                    error_kind: None,
                }
            }
            Err(err) => {
                error!("{operation} failed: {err}");
                Invocation::failed(id, Some(operation), &err)
            }
        }
    }
    .instrument(span)
    .await
}
