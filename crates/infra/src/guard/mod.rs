//! Per-principal version guard (compare-and-swap over [`VersionStore`]).
//!
//! The guard decides which trigger is allowed to write claims for a principal.
//! A candidate is admitted only when its version is strictly newer than the
//! recorded one, or equal to it while nobody holds the slot (a redelivery of a
//! write that never landed). Admission hands out a [`Ticket`]; the holder
//! writes, then either `settle`s or `release`s.
//!
//! Because two admitted writes can still reach the identity store out of order,
//! `settle` reports [`Settlement::Superseded`] when a newer version was admitted
//! in the meantime, and the caller re-writes the newer claims. The record's
//! `last_written` marker lets a later stale trigger finish that repair if the
//! original caller died before doing it.

pub mod in_memory;
pub mod postgres;
pub mod record;
pub mod store;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use claimsync_auth::ClaimsSet;
use claimsync_core::{AttemptId, ExpectedRevision, PrincipalId, SyncError, SyncVersion};

use crate::config::SyncConfig;
use crate::gateway::bounded;

pub use in_memory::InMemoryVersionStore;
pub use postgres::PostgresVersionStore;
pub use record::{Admission, GuardRecord, Settlement, SlotState, Ticket};
pub use store::{StoredGuardRecord, VersionStore};

use record::{decide_admit, decide_release, decide_settle};

enum Step<T> {
    Swap(GuardRecord, T),
    Keep(T),
}

#[derive(Debug, Clone)]
pub struct VersionGuard<V> {
    store: V,
    lease_ttl: chrono::Duration,
    call_timeout: Duration,
    max_retries: u32,
}

impl<V> VersionGuard<V>
where
    V: VersionStore,
{
    pub fn new(store: V, config: &SyncConfig) -> Self {
        Self {
            store,
            lease_ttl: chrono::Duration::from_std(config.lease_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(24)),
            call_timeout: config.write_timeout,
            max_retries: config.cas_max_retries,
        }
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    /// Try to take the slot for `candidate`.
    pub async fn admit(
        &self,
        principal_id: &PrincipalId,
        candidate: SyncVersion,
        claims: &ClaimsSet,
    ) -> Result<Admission, SyncError> {
        let lease_ttl = self.lease_ttl;
        self.swap_loop(principal_id, |current, now| {
            match decide_admit(current, principal_id, candidate, claims, now, lease_ttl) {
                Ok((record, ticket)) => Step::Swap(record, Admission::Accepted(ticket)),
                Err(rejected) => Step::Keep(rejected),
            }
        })
        .await
    }

    /// Give the slot back after the ticket's write failed.
    pub async fn release(&self, ticket: &Ticket) -> Result<(), SyncError> {
        self.swap_loop(&ticket.principal_id, |current, _| {
            match current.and_then(|record| decide_release(record, ticket)) {
                Some(record) => Step::Swap(record, ()),
                None => Step::Keep(()),
            }
        })
        .await
    }

    /// Report that `written`'s claims were stored. `attempt` is `None` for repair writes.
    pub async fn settle(
        &self,
        principal_id: &PrincipalId,
        written: SyncVersion,
        attempt: Option<AttemptId>,
    ) -> Result<Settlement, SyncError> {
        self.swap_loop(principal_id, |current, _| {
            let Some(current) = current else {
                return Step::Keep(Settlement::Settled);
            };
            let (next, settlement) = decide_settle(current, written, attempt);
            if next == *current {
                Step::Keep(settlement)
            } else {
                Step::Swap(next, settlement)
            }
        })
        .await
    }

    pub async fn current(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<GuardRecord>, SyncError> {
        let stored = self.load_stored(principal_id).await?;
        Ok(stored.map(|s| s.record))
    }

    async fn load_stored(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<StoredGuardRecord>, SyncError> {
        let stored = bounded("guard load", self.call_timeout, self.store.load(principal_id)).await?;
        Ok(stored)
    }

    async fn swap_loop<T, F>(
        &self,
        principal_id: &PrincipalId,
        mut decide: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut(Option<&GuardRecord>, DateTime<Utc>) -> Step<T>,
    {
        for round in 0..=self.max_retries {
            let stored = self.load_stored(principal_id).await?;
            let expected = ExpectedRevision::of(stored.as_ref().map(|s| s.revision));

            match decide(stored.as_ref().map(|s| &s.record), Utc::now()) {
                Step::Keep(out) => return Ok(out),
                Step::Swap(record, out) => {
                    let swapped = bounded(
                        "guard swap",
                        self.call_timeout,
                        self.store.compare_and_swap(principal_id, expected, &record),
                    )
                    .await?;
                    if swapped {
                        return Ok(out);
                    }
                    debug!(%principal_id, round, "guard swap lost a race; reloading");
                }
            }
        }

        Err(SyncError::transient(format!(
            "guard for {principal_id} still contended after {} attempts",
            self.max_retries + 1
        )))
    }
}
