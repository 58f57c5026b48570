use std::io;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use claimsync_core::{DomainError, EventId};
use claimsync_events::{
    ArrivalClock, EventBus, EventEnvelope, InMemoryBusError, InMemoryEventBus, SyncTrigger,
};
use claimsync_infra::workers::WorkerStats;
use claimsync_infra::{
    EventRouter, InMemoryIdentityStore, InMemoryProfileStore, InMemoryVersionStore,
    PostgresIdentityStore, PostgresProfileStore, PostgresVersionStore, RecordingSink, RetryPolicy,
    SyncConfig, SyncWorker, SyncWorkerHandle, TracingSink, TriggerHandler, db,
};

use super::settings::{ApiSettings, DatabaseUrls};

type TriggerBus = InMemoryEventBus<EventEnvelope<SyncTrigger>>;

/// Everything the HTTP handlers need.
pub struct AppServices {
    handler: Arc<dyn TriggerHandler>,
    arrivals: ArrivalClock,
    queue: Arc<TriggerBus>,
    worker: SyncWorkerHandle,
}

impl AppServices {
    /// Wire the handler and start the worker behind asynchronous ingress.
    ///
    /// Must be called from within a multi-thread tokio runtime.
    pub fn start(handler: Arc<dyn TriggerHandler>, redelivery: RetryPolicy) -> io::Result<Self> {
        let runtime = Handle::try_current().map_err(io::Error::other)?;
        let queue = Arc::new(TriggerBus::new());
        let worker = SyncWorker::spawn(
            "claimsync-ingress",
            queue.clone(),
            handler.clone(),
            runtime,
            redelivery,
        )?;
        Ok(Self {
            handler,
            arrivals: ArrivalClock::new(),
            queue,
            worker,
        })
    }

    pub fn handler(&self) -> &dyn TriggerHandler {
        self.handler.as_ref()
    }

    /// Wrap an inbound trigger.
    ///
    /// A caller-supplied event id must be a UUIDv7: its timestamp is the
    /// trigger's arrival, so every redelivery of the event versions the same.
    pub fn receive(
        &self,
        event_id: Option<EventId>,
        trigger: SyncTrigger,
    ) -> Result<EventEnvelope<SyncTrigger>, DomainError> {
        match event_id {
            Some(id) => EventEnvelope::identified(id, trigger),
            None => Ok(self.arrivals.receive(trigger)),
        }
    }

    /// Hand a trigger to the background worker, which redelivers it on transient failures.
    pub fn enqueue(&self, envelope: EventEnvelope<SyncTrigger>) -> Result<(), InMemoryBusError> {
        self.queue.publish(envelope)
    }

    pub fn queue_stats(&self) -> WorkerStats {
        self.worker.stats()
    }

    pub fn dead_lettered(&self) -> usize {
        self.worker.dead_letters().len()
    }
}

/// Handles to the in-memory stores behind [`in_memory_services`], for seeding and inspection.
#[derive(Clone)]
pub struct InMemoryBackends {
    pub profiles: Arc<InMemoryProfileStore>,
    pub identity: Arc<InMemoryIdentityStore>,
    pub versions: Arc<InMemoryVersionStore>,
    pub outcomes: Arc<RecordingSink>,
}

pub fn in_memory_services(
    config: &SyncConfig,
    identity: InMemoryIdentityStore,
) -> io::Result<(AppServices, InMemoryBackends)> {
    let backends = InMemoryBackends {
        profiles: Arc::new(InMemoryProfileStore::new()),
        identity: Arc::new(identity),
        versions: Arc::new(InMemoryVersionStore::new()),
        outcomes: Arc::new(RecordingSink::new()),
    };

    let router = EventRouter::new(
        backends.profiles.clone(),
        backends.identity.clone(),
        backends.versions.clone(),
        (TracingSink, backends.outcomes.clone()),
        config,
    );
    let services = AppServices::start(Arc::new(router), config.redelivery.clone())?;
    Ok((services, backends))
}

async fn postgres_services(
    config: &SyncConfig,
    urls: &DatabaseUrls,
) -> anyhow::Result<AppServices> {
    let profiles = db::connect(&urls.profiles, 10).await?;
    let identity = db::connect(&urls.identity, 10).await?;
    let guard = db::connect(&urls.guard, 10).await?;
    for pool in [&profiles, &identity, &guard] {
        db::ensure_schema(pool).await?;
    }

    let router = EventRouter::new(
        PostgresProfileStore::new(profiles),
        PostgresIdentityStore::new(identity),
        PostgresVersionStore::new(guard),
        TracingSink,
        config,
    );
    Ok(AppServices::start(Arc::new(router), config.redelivery.clone())?)
}

pub async fn build_services(settings: &ApiSettings) -> anyhow::Result<AppServices> {
    match &settings.databases {
        Some(urls) => {
            info!(version_source = %settings.sync.version_source, "using postgres stores");
            postgres_services(&settings.sync, urls).await
        }
        None => {
            tracing::warn!("no PROFILE_DATABASE_URL set; running with in-memory stores (dev only)");
            let (services, _) =
                in_memory_services(&settings.sync, InMemoryIdentityStore::permissive())?;
            Ok(services)
        }
    }
}
