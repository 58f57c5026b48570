//! Domain error model and the sync failure taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::SyncVersion;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures (validation, identifiers,
/// optimistic concurrency). Store and network concerns belong to the gateways.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. empty principal id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A compare-and-swap lost against a concurrent writer.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Classification of a synchronization attempt that did not apply claims.
///
/// Only `Transient` asks the trigger infrastructure for redelivery. `NotFound`
/// and `Stale` are expected under normal operation and are not errors from the
/// event source's point of view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    Stale,
    Transient,
    Permanent,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Stale => "stale",
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        }
    }

    /// Whether the same event should be delivered again.
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl core::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a sync pipeline run stopped short of applying claims.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The principal has no profile yet. A later profile event will sync it.
    #[error("no profile exists for principal")]
    NotFound,

    /// A newer (or equal, already applied) version has been admitted.
    #[error("stale attempt: candidate {candidate} is not newer than {current}")]
    Stale {
        candidate: SyncVersion,
        current: SyncVersion,
    },

    /// Timeout or temporary unavailability of a store.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Data that can never be synced as-is (malformed profile, unknown principal).
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl SyncError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::NotFound => ErrorClass::NotFound,
            SyncError::Stale { .. } => ErrorClass::Stale,
            SyncError::Transient(_) => ErrorClass::Transient,
            SyncError::Permanent(_) => ErrorClass::Permanent,
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(value: DomainError) -> Self {
        match value {
            // Losing a CAS race is retryable; the next attempt reloads the record.
            DomainError::Conflict(msg) => SyncError::Transient(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => SyncError::Permanent(msg),
        }
    }
}
