//! Failures of the remote stores this core talks to.
//!
//! Every gateway (profile store, identity store, version store) reports
//! failures as [`GatewayError`]; classification into the sync taxonomy happens
//! once, in the `From` impl below.
//!
//! ## SQLx mapping
//!
//! | SQLx error | PostgreSQL code | GatewayError |
//! |---|---|---|
//! | Database (serialization failure / deadlock / cancel) | `40001`, `40P01`, `57014` | `Unavailable` |
//! | Database (integrity constraint) | `23xxx` | `Rejected` |
//! | Decode / ColumnDecode / ColumnNotFound | N/A | `Malformed` |
//! | anything else (pool timeout, IO, TLS, protocol) | N/A | `Unavailable` |

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use claimsync_core::SyncError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The call did not complete within its budget.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// The store could not be reached or asked us to back off.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data that cannot be interpreted.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The store refused the operation (e.g. unknown principal).
    #[error("rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

impl From<GatewayError> for SyncError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Timeout { .. } | GatewayError::Unavailable(_) => {
                SyncError::Transient(value.to_string())
            }
            GatewayError::Malformed(_) | GatewayError::Rejected(_) => {
                SyncError::Permanent(value.to_string())
            }
        }
    }
}

/// Run a gateway call under a deadline. Elapsed deadlines become `Timeout`.
pub async fn bounded<T, F>(
    operation: &'static str,
    budget: Duration,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            operation,
            after_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> GatewayError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("40001") | Some("40P01") | Some("57014") => {
                GatewayError::Unavailable(format!("{operation}: {err}"))
            }
            Some(code) if code.starts_with("23") => {
                GatewayError::Rejected(format!("{operation}: {err}"))
            }
            _ => GatewayError::Unavailable(format!("{operation}: {err}")),
        },
        sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_) => GatewayError::Malformed(format!("{operation}: {err}")),
        _ => GatewayError::Unavailable(format!("{operation}: {err}")),
    }
}
