//! Per-principal guard state and the pure decisions over it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use claimsync_auth::ClaimsSet;
use claimsync_core::{AttemptId, PrincipalId, SyncVersion};

/// Who currently owns the principal's newest admitted version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// An attempt was admitted and is writing; others keep out until the lease ends.
    InFlight {
        attempt: AttemptId,
        lease_expires_at: DateTime<Utc>,
    },
    /// The owning attempt failed its write and gave the slot back.
    Released,
    /// The owning attempt's write landed.
    Applied,
}

impl SlotState {
    /// Whether a redelivery of the same version may take the slot.
    pub fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        match self {
            SlotState::InFlight {
                lease_expires_at, ..
            } => *lease_expires_at <= now,
            SlotState::Released => true,
            SlotState::Applied => false,
        }
    }

    pub fn is_owned_by(&self, attempt: AttemptId) -> bool {
        matches!(self, SlotState::InFlight { attempt: owner, .. } if *owner == attempt)
    }
}

/// The guard's view of one principal.
///
/// `version`/`claims` only ever move forward. `last_written` is the version
/// whose claims were most recently reported written to the identity store;
/// when it lags `version` after the owner is done, a repair write is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRecord {
    pub version: SyncVersion,
    pub claims: ClaimsSet,
    pub slot: SlotState,
    #[serde(default)]
    pub last_written: Option<SyncVersion>,
}

impl GuardRecord {
    /// Claims that must be re-written because a stale write may have landed last.
    pub fn pending_repair(&self, now: DateTime<Utc>) -> Option<(SyncVersion, ClaimsSet)> {
        let owner_busy =
            matches!(self.slot, SlotState::InFlight { .. }) && !self.slot.is_reclaimable(now);
        if owner_busy || self.last_written == Some(self.version) {
            return None;
        }
        Some((self.version, self.claims.clone()))
    }
}

/// Proof of admission, held by the attempt that must now write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub principal_id: PrincipalId,
    pub version: SyncVersion,
    pub attempt: AttemptId,
    pub claims: ClaimsSet,
}

/// Result of asking the guard to admit a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(Ticket),
    Rejected {
        current: SyncVersion,
        /// Set when the identity store may hold older claims than `current`.
        repair: Option<(SyncVersion, ClaimsSet)>,
    },
}

/// Result of reporting a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The written claims are the newest admitted ones.
    Settled,
    /// A newer version was admitted meanwhile; its claims must be written too.
    Superseded {
        version: SyncVersion,
        claims: ClaimsSet,
    },
}

/// Admit `candidate` over `current`, or say why not.
pub(crate) fn decide_admit(
    current: Option<&GuardRecord>,
    principal_id: &PrincipalId,
    candidate: SyncVersion,
    claims: &ClaimsSet,
    now: DateTime<Utc>,
    lease_ttl: Duration,
) -> Result<(GuardRecord, Ticket), Admission> {
    if let Some(record) = current {
        let newer = candidate > record.version;
        let reclaim = candidate == record.version && record.slot.is_reclaimable(now);
        if !newer && !reclaim {
            return Err(Admission::Rejected {
                current: record.version,
                repair: record.pending_repair(now),
            });
        }
    }

    let attempt = AttemptId::new();
    let record = GuardRecord {
        version: candidate,
        claims: claims.clone(),
        slot: SlotState::InFlight {
            attempt,
            lease_expires_at: now + lease_ttl,
        },
        last_written: current.and_then(|r| r.last_written),
    };
    let ticket = Ticket {
        principal_id: principal_id.clone(),
        version: candidate,
        attempt,
        claims: claims.clone(),
    };
    Ok((record, ticket))
}

/// Give the slot back after a failed write. `None` when there is nothing to change.
pub(crate) fn decide_release(current: &GuardRecord, ticket: &Ticket) -> Option<GuardRecord> {
    if current.version != ticket.version || !current.slot.is_owned_by(ticket.attempt) {
        return None;
    }
    Some(GuardRecord {
        slot: SlotState::Released,
        ..current.clone()
    })
}

/// Record that `written`'s claims reached the identity store.
///
/// `attempt` is the writer's ticket, or `None` for a repair write.
pub(crate) fn decide_settle(
    current: &GuardRecord,
    written: SyncVersion,
    attempt: Option<AttemptId>,
) -> (GuardRecord, Settlement) {
    let mut next = current.clone();
    next.last_written = Some(written);

    if current.version > written {
        let settlement = Settlement::Superseded {
            version: current.version,
            claims: current.claims.clone(),
        };
        return (next, settlement);
    }

    if let Some(attempt) = attempt {
        if current.slot.is_owned_by(attempt) {
            next.slot = SlotState::Applied;
        }
    }
    (next, Settlement::Settled)
}
