//! EventRouter: drives one trigger through read → resolve → admit → write → settle.
//!
//! `handle` never fails. Every downstream error is classified into the
//! outcome, and the report's [`Disposition`] tells the trigger source whether
//! to redeliver (transient failures only).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use claimsync_auth::{ClaimsSet, ProfileRecord, resolve_claims};
use claimsync_core::{AttemptId, ErrorClass, EventId, PrincipalId, SyncError, SyncVersion};
use claimsync_events::{Arrival, Event, EventEnvelope, SyncTrigger};

use crate::config::SyncConfig;
use crate::gateway::bounded;
use crate::guard::{Admission, Settlement, VersionGuard, VersionStore};
use crate::identity::IdentityClaimsWriter;
use crate::outcome::{OutcomeSink, SyncOutcome};
use crate::profile_store::ProfileStore;
use crate::versioning::VersionSource;

/// What the trigger source should do with the event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Handled; do not deliver again.
    Ack,
    /// Transient failure; deliver again later.
    Redeliver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub disposition: Disposition,
}

impl SyncReport {
    /// Classify `outcome`: only transient failures are redelivered.
    pub fn for_outcome(outcome: SyncOutcome) -> Self {
        let disposition = if outcome.reason.class().is_some_and(ErrorClass::is_retriable) {
            Disposition::Redeliver
        } else {
            Disposition::Ack
        };
        Self { outcome, disposition }
    }
}

#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope<SyncTrigger>) -> SyncReport;

    /// Account for a trigger addressed to `principal_id` whose payload could not
    /// be decoded. Always a permanent failure.
    fn undecodable(
        &self,
        event_id: EventId,
        principal_id: PrincipalId,
        event_type: &'static str,
        detail: &str,
    ) -> SyncReport;
}

#[async_trait]
impl<H> TriggerHandler for Arc<H>
where
    H: TriggerHandler + ?Sized,
{
    async fn handle(&self, envelope: &EventEnvelope<SyncTrigger>) -> SyncReport {
        (**self).handle(envelope).await
    }

    fn undecodable(
        &self,
        event_id: EventId,
        principal_id: PrincipalId,
        event_type: &'static str,
        detail: &str,
    ) -> SyncReport {
        (**self).undecodable(event_id, principal_id, event_type, detail)
    }
}

pub struct EventRouter<P, W, V, S> {
    profiles: P,
    writer: W,
    guard: VersionGuard<V>,
    sink: S,
    version_source: VersionSource,
    read_timeout: Duration,
    write_timeout: Duration,
    max_repair_rounds: u32,
}

impl<P, W, V, S> EventRouter<P, W, V, S>
where
    P: ProfileStore,
    W: IdentityClaimsWriter,
    V: VersionStore,
    S: OutcomeSink,
{
    pub fn new(profiles: P, writer: W, versions: V, sink: S, config: &SyncConfig) -> Self {
        Self {
            profiles,
            writer,
            guard: VersionGuard::new(versions, config),
            sink,
            version_source: config.version_source,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_repair_rounds: config.cas_max_retries,
        }
    }

    pub fn guard(&self) -> &VersionGuard<V> {
        &self.guard
    }

    /// Snapshot, claims and candidate version for the trigger.
    async fn prepare(
        &self,
        trigger: &SyncTrigger,
        arrival: Arrival,
    ) -> Result<(ClaimsSet, SyncVersion), SyncError> {
        let profile = self.snapshot(trigger).await?;
        let claims = resolve_claims(&profile);
        let version = self.version_source.candidate_version(&profile, arrival)?;
        Ok((claims, version))
    }

    async fn snapshot(&self, trigger: &SyncTrigger) -> Result<ProfileRecord, SyncError> {
        let profile = match trigger {
            SyncTrigger::PrincipalCreated(event) => bounded(
                "profile fetch",
                self.read_timeout,
                self.profiles.fetch(&event.principal_id),
            )
            .await?
            .ok_or(SyncError::NotFound)?,
            SyncTrigger::ProfileUpdated(event) => event.after.clone(),
        };

        if profile.principal_id != *trigger.principal_id() {
            return Err(SyncError::permanent(format!(
                "trigger for {} carries a profile for {}",
                trigger.principal_id(),
                profile.principal_id
            )));
        }
        Ok(profile)
    }

    async fn apply(
        &self,
        principal_id: &PrincipalId,
        candidate: SyncVersion,
        claims: &ClaimsSet,
    ) -> Result<(), SyncError> {
        let ticket = match self.guard.admit(principal_id, candidate, claims).await? {
            Admission::Accepted(ticket) => ticket,
            Admission::Rejected { current, repair } => {
                if let Some((version, claims)) = repair {
                    debug!(%principal_id, %version, "re-applying newest claims left unwritten");
                    self.write(principal_id, &claims).await?;
                    self.converge(principal_id, version, None).await?;
                }
                return Err(SyncError::Stale { candidate, current });
            }
        };

        if let Err(err) = self.write(principal_id, &ticket.claims).await {
            if let Err(release_err) = self.guard.release(&ticket).await {
                // The lease still frees the slot once it expires.
                warn!(%principal_id, error = %release_err, "could not release guard slot");
            }
            return Err(err);
        }

        self.converge(principal_id, ticket.version, Some(ticket.attempt)).await
    }

    /// Settle a landed write; while newer claims were admitted meanwhile, write those too.
    async fn converge(
        &self,
        principal_id: &PrincipalId,
        mut written: SyncVersion,
        mut attempt: Option<AttemptId>,
    ) -> Result<(), SyncError> {
        for _ in 0..=self.max_repair_rounds {
            match self.guard.settle(principal_id, written, attempt).await? {
                Settlement::Settled => return Ok(()),
                Settlement::Superseded { version, claims } => {
                    debug!(%principal_id, %written, %version, "write superseded; re-applying");
                    self.write(principal_id, &claims).await?;
                    written = version;
                    attempt = None;
                }
            }
        }
        Err(SyncError::transient(format!(
            "claims for {principal_id} kept moving after {} repair writes",
            self.max_repair_rounds + 1
        )))
    }

    async fn write(&self, principal_id: &PrincipalId, claims: &ClaimsSet) -> Result<(), SyncError> {
        bounded("claims write", self.write_timeout, self.writer.set_claims(principal_id, claims))
            .await
            .map_err(SyncError::from)
    }
}

#[async_trait]
impl<P, W, V, S> TriggerHandler for EventRouter<P, W, V, S>
where
    P: ProfileStore,
    W: IdentityClaimsWriter,
    V: VersionStore,
    S: OutcomeSink,
{
    #[instrument(
        skip(self, envelope),
        fields(
            event_id = %envelope.event_id(),
            event_type = envelope.payload().event_type(),
            principal_id = %envelope.payload().principal_id(),
            delivery_attempt = envelope.delivery_attempt(),
        )
    )]
    async fn handle(&self, envelope: &EventEnvelope<SyncTrigger>) -> SyncReport {
        let trigger = envelope.payload();
        let principal_id = trigger.principal_id().clone();
        let event_type = trigger.event_type();

        let event_id = envelope.event_id();

        let outcome = match self.prepare(trigger, envelope.arrival()).await {
            Err(err) => SyncOutcome::from_error(principal_id, event_id, event_type, None, &err),
            Ok((claims, version)) => match self.apply(&principal_id, version, &claims).await {
                Ok(()) => SyncOutcome::applied(principal_id, event_id, event_type, version),
                Err(err) => {
                    SyncOutcome::from_error(principal_id, event_id, event_type, Some(version), &err)
                }
            },
        };

        self.sink.emit(&outcome);
        SyncReport::for_outcome(outcome)
    }

    fn undecodable(
        &self,
        event_id: EventId,
        principal_id: PrincipalId,
        event_type: &'static str,
        detail: &str,
    ) -> SyncReport {
        warn!(%event_id, %principal_id, event_type, detail, "trigger payload could not be decoded");
        let err = SyncError::permanent(format!("undecodable {event_type} payload: {detail}"));
        let outcome = SyncOutcome::from_error(principal_id, event_id, event_type, None, &err);
        self.sink.emit(&outcome);
        SyncReport::for_outcome(outcome)
    }
}
