//! Sync outcomes and the sinks they are reported to.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use claimsync_core::{ErrorClass, EventId, PrincipalId, SyncError, SyncVersion};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Rejected,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    Applied,
    NotFound,
    Stale,
    Transient,
    Permanent,
}

impl OutcomeReason {
    pub fn decision(self) -> Decision {
        match self {
            OutcomeReason::Applied => Decision::Accepted,
            OutcomeReason::NotFound | OutcomeReason::Stale => Decision::Rejected,
            OutcomeReason::Transient | OutcomeReason::Permanent => Decision::Failed,
        }
    }

    /// Failure class behind the reason; `None` for a successful sync.
    pub fn class(self) -> Option<ErrorClass> {
        match self {
            OutcomeReason::Applied => None,
            OutcomeReason::NotFound => Some(ErrorClass::NotFound),
            OutcomeReason::Stale => Some(ErrorClass::Stale),
            OutcomeReason::Transient => Some(ErrorClass::Transient),
            OutcomeReason::Permanent => Some(ErrorClass::Permanent),
        }
    }
}

impl From<ErrorClass> for OutcomeReason {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::NotFound => OutcomeReason::NotFound,
            ErrorClass::Stale => OutcomeReason::Stale,
            ErrorClass::Transient => OutcomeReason::Transient,
            ErrorClass::Permanent => OutcomeReason::Permanent,
        }
    }
}

/// What happened to one handled trigger. Emitted exactly once per `handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub principal_id: PrincipalId,
    pub event_id: EventId,
    pub event_type: String,
    pub decision: Decision,
    pub reason: OutcomeReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Candidate version of the trigger, when one was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<SyncVersion>,
    pub timestamp: DateTime<Utc>,
}

impl SyncOutcome {
    pub fn applied(
        principal_id: PrincipalId,
        event_id: EventId,
        event_type: &str,
        version: SyncVersion,
    ) -> Self {
        Self {
            principal_id,
            event_id,
            event_type: event_type.to_string(),
            decision: Decision::Accepted,
            reason: OutcomeReason::Applied,
            detail: None,
            version: Some(version),
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(
        principal_id: PrincipalId,
        event_id: EventId,
        event_type: &str,
        version: Option<SyncVersion>,
        error: &SyncError,
    ) -> Self {
        let reason = OutcomeReason::from(error.class());
        Self {
            principal_id,
            event_id,
            event_type: event_type.to_string(),
            decision: reason.decision(),
            reason,
            detail: Some(error.to_string()),
            version,
            timestamp: Utc::now(),
        }
    }
}

/// Observability sink for outcomes. Must not fail the pipeline.
pub trait OutcomeSink: Send + Sync {
    fn emit(&self, outcome: &SyncOutcome);
}

impl<S> OutcomeSink for Arc<S>
where
    S: OutcomeSink + ?Sized,
{
    fn emit(&self, outcome: &SyncOutcome) {
        (**self).emit(outcome)
    }
}

/// Reports outcomes as structured `tracing` events under `claimsync::outcome`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn emit(&self, outcome: &SyncOutcome) {
        let version = outcome.version.map(|v| v.to_string()).unwrap_or_default();
        let detail = outcome.detail.as_deref().unwrap_or("");
        match outcome.reason {
            OutcomeReason::Applied => tracing::info!(
                target: "claimsync::outcome",
                principal_id = %outcome.principal_id,
                event_id = %outcome.event_id,
                event_type = %outcome.event_type,
                decision = "accepted",
                reason = "applied",
                version = %version,
                "claims synced"
            ),
            OutcomeReason::NotFound | OutcomeReason::Stale => tracing::debug!(
                target: "claimsync::outcome",
                principal_id = %outcome.principal_id,
                event_id = %outcome.event_id,
                event_type = %outcome.event_type,
                decision = "rejected",
                reason = ?outcome.reason,
                version = %version,
                detail,
                "trigger skipped"
            ),
            OutcomeReason::Transient => tracing::warn!(
                target: "claimsync::outcome",
                principal_id = %outcome.principal_id,
                event_id = %outcome.event_id,
                event_type = %outcome.event_type,
                decision = "failed",
                reason = "transient",
                version = %version,
                detail,
                "sync failed; redelivery requested"
            ),
            OutcomeReason::Permanent => tracing::error!(
                target: "claimsync::outcome",
                principal_id = %outcome.principal_id,
                event_id = %outcome.event_id,
                event_type = %outcome.event_type,
                decision = "failed",
                reason = "permanent",
                version = %version,
                detail,
                "sync failed permanently"
            ),
        }
    }
}

/// Collects outcomes in memory (tests/dev).
#[derive(Debug, Default)]
pub struct RecordingSink {
    outcomes: Mutex<Vec<SyncOutcome>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<SyncOutcome> {
        self.outcomes.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn for_principal(&self, principal_id: &PrincipalId) -> Vec<SyncOutcome> {
        self.outcomes()
            .into_iter()
            .filter(|o| o.principal_id == *principal_id)
            .collect()
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.outcomes().iter().filter(|o| o.decision == decision).count()
    }
}

impl OutcomeSink for RecordingSink {
    fn emit(&self, outcome: &SyncOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome.clone());
        }
    }
}

/// Fan an outcome out to several sinks.
impl<A, B> OutcomeSink for (A, B)
where
    A: OutcomeSink,
    B: OutcomeSink,
{
    fn emit(&self, outcome: &SyncOutcome) {
        self.0.emit(outcome);
        self.1.emit(outcome);
    }
}
