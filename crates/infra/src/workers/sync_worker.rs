use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use claimsync_events::{Event, EventBus, EventEnvelope, Subscription, SyncTrigger};

use crate::outcome::{Decision, SyncOutcome};
use crate::retry::RetryPolicy;
use crate::router::{Disposition, TriggerHandler};

type Envelope = EventEnvelope<SyncTrigger>;

/// A trigger that kept failing transiently until the policy gave up.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub last_outcome: SyncOutcome,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Counters since the worker started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub handled: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Default)]
struct Shared {
    handled: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl Shared {
    fn record(&self, outcome: &SyncOutcome) {
        self.handled.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome.decision {
            Decision::Accepted => &self.accepted,
            Decision::Rejected => &self.rejected,
            Decision::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            handled: self.handled.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Handle to observe, control and join a running sync worker.
#[derive(Debug)]
pub struct SyncWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl SyncWorkerHandle {
    pub fn stats(&self) -> WorkerStats {
        self.shared.snapshot()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared
            .dead_letters
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// Redeliveries already scheduled on the runtime still publish to the bus.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Consumes trigger envelopes from a bus and feeds them to a [`TriggerHandler`].
///
/// Runs on its own thread and drives the async handler with
/// [`Handle::block_on`], so the runtime behind `runtime` must be a
/// multi-thread runtime (a current-thread runtime would not advance timers
/// from here). Envelopes reported as `Redeliver` are published again after the
/// policy's backoff; once the policy is exhausted they are dead-lettered.
#[derive(Debug)]
pub struct SyncWorker;

impl SyncWorker {
    pub fn spawn<B, H>(
        name: &'static str,
        bus: Arc<B>,
        handler: H,
        runtime: Handle,
        policy: RetryPolicy,
    ) -> io::Result<SyncWorkerHandle>
    where
        B: EventBus<Envelope> + 'static,
        H: TriggerHandler + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<Envelope> = bus.subscribe();
        let shared = Arc::new(Shared::default());

        let worker = Worker {
            name,
            bus,
            handler,
            runtime,
            policy,
            shared: shared.clone(),
        };
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker.run(sub, shutdown_rx))?;

        Ok(SyncWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            shared,
        })
    }
}

struct Worker<B, H> {
    name: &'static str,
    bus: Arc<B>,
    handler: H,
    runtime: Handle,
    policy: RetryPolicy,
    shared: Arc<Shared>,
}

impl<B, H> Worker<B, H>
where
    B: EventBus<Envelope> + 'static,
    H: TriggerHandler,
{
    fn run(self, sub: Subscription<Envelope>, shutdown_rx: mpsc::Receiver<()>) {
        let tick = Duration::from_millis(250);

        loop {
            // A dropped handle stops the worker too.
            match shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match sub.recv_timeout(tick) {
                Ok(envelope) => self.process(envelope),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = self.name, "sync worker stopped");
    }

    fn process(&self, envelope: Envelope) {
        let report = self.runtime.block_on(self.handler.handle(&envelope));
        self.shared.record(&report.outcome);

        if report.disposition == Disposition::Ack {
            return;
        }

        let redeliveries = envelope.delivery_attempt().saturating_sub(1);
        if !self.policy.should_retry(redeliveries) {
            self.dead_letter(envelope, report.outcome);
            return;
        }

        let delay = self.policy.delay_for_attempt(redeliveries + 1);
        let next = envelope.redelivered();
        debug!(
            worker = self.name,
            event_id = %next.event_id(),
            delivery_attempt = next.delivery_attempt(),
            delay_ms = delay.as_millis() as u64,
            "scheduling redelivery"
        );

        self.shared.redelivered.fetch_add(1, Ordering::Relaxed);
        let bus = self.bus.clone();
        let name = self.name;
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = bus.publish(next) {
                warn!(worker = name, error = ?err, "redelivery publish failed");
            }
        });
    }

    fn dead_letter(&self, envelope: Envelope, last_outcome: SyncOutcome) {
        error!(
            worker = self.name,
            event_id = %envelope.event_id(),
            event_type = envelope.payload().event_type(),
            principal_id = %envelope.payload().principal_id(),
            attempts = envelope.delivery_attempt(),
            detail = last_outcome.detail.as_deref().unwrap_or(""),
            "trigger dead-lettered after exhausting redeliveries"
        );

        self.shared.dead_lettered.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut dead_letters) = self.shared.dead_letters.lock() {
            dead_letters.push(DeadLetter {
                envelope,
                last_outcome,
                dead_lettered_at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    use async_trait::async_trait;
    use claimsync_core::{PrincipalId, SyncError};
    use claimsync_events::{InMemoryEventBus, PrincipalCreated};

    use crate::router::SyncReport;

    /// Fails transiently for the first `failures` deliveries, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TriggerHandler for Flaky {
        async fn handle(&self, envelope: &Envelope) -> SyncReport {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let trigger = envelope.payload();
            let (outcome, disposition) = if call < self.failures {
                let err = SyncError::transient("store down");
                (
                    SyncOutcome::from_error(
                        trigger.principal_id().clone(),
                        envelope.event_id(),
                        trigger.event_type(),
                        None,
                        &err,
                    ),
                    Disposition::Redeliver,
                )
            } else {
                (
                    SyncOutcome::applied(
                        trigger.principal_id().clone(),
                        envelope.event_id(),
                        trigger.event_type(),
                        claimsync_core::SyncVersion::new(1, 0),
                    ),
                    Disposition::Ack,
                )
            };
            SyncReport { outcome, disposition }
        }

        fn undecodable(
            &self,
            event_id: claimsync_core::EventId,
            principal_id: PrincipalId,
            event_type: &'static str,
            detail: &str,
        ) -> SyncReport {
            let err = SyncError::permanent(detail);
            let outcome = SyncOutcome::from_error(principal_id, event_id, event_type, None, &err);
            SyncReport::for_outcome(outcome)
        }
    }

    fn trigger() -> Envelope {
        EventEnvelope::received(SyncTrigger::from(PrincipalCreated {
            principal_id: PrincipalId::new("uid-1").unwrap(),
        }))
    }

    async fn wait_for(
        handle: &SyncWorkerHandle,
        done: impl Fn(&WorkerStats) -> bool,
    ) -> WorkerStats {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let stats = handle.stats();
            if done(&stats) || Instant::now() > deadline {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transient_failures_are_redelivered_until_success() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let handle = SyncWorker::spawn(
            "sync-test",
            bus.clone(),
            handler,
            Handle::current(),
            RetryPolicy::fixed(5, Duration::from_millis(10)),
        )
        .unwrap();

        bus.publish(trigger()).unwrap();
        let stats = wait_for(&handle, |s| s.accepted == 1).await;

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.redelivered, 2);
        assert_eq!(stats.accepted, 1);
        assert!(handle.dead_letters().is_empty());
        handle.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exhausted_policy_dead_letters() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let handle = SyncWorker::spawn(
            "sync-test",
            bus.clone(),
            handler,
            Handle::current(),
            RetryPolicy::fixed(1, Duration::from_millis(10)),
        )
        .unwrap();

        bus.publish(trigger()).unwrap();
        let stats = wait_for(&handle, |s| s.dead_lettered == 1).await;

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.redelivered, 1);
        let dead = handle.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].envelope.delivery_attempt(), 2);
        handle.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_the_handle_stops_the_worker() {
        let bus = Arc::new(InMemoryEventBus::new());
        let handle = SyncWorker::spawn(
            "sync-test",
            bus.clone(),
            Flaky {
                failures: 0,
                calls: AtomicU32::new(0),
            },
            Handle::current(),
            RetryPolicy::no_retry(),
        )
        .unwrap();
        drop(handle);

        // Once the thread exits its subscription goes with it.
        let deadline = Instant::now() + Duration::from_secs(5);
        while bus.subscriber_count() > 0 && Instant::now() < deadline {
            let _ = bus.publish(trigger());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(bus.publish(trigger()).is_err());
    }
}
