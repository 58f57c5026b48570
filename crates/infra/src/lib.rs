//! Infrastructure layer: gateways, version guard, router, workers, config.

pub mod config;
pub mod db;
pub mod faults;
pub mod gateway;
pub mod guard;
pub mod identity;
pub mod outcome;
pub mod profile_store;
pub mod retry;
pub mod router;
pub mod versioning;
pub mod workers;


pub use config::{ConfigError, SyncConfig};
pub use faults::InjectedFaults;
pub use gateway::GatewayError;
pub use guard::{InMemoryVersionStore, PostgresVersionStore, VersionGuard, VersionStore};
pub use identity::{IdentityClaimsWriter, InMemoryIdentityStore, PostgresIdentityStore};
pub use outcome::{Decision, OutcomeReason, OutcomeSink, RecordingSink, SyncOutcome, TracingSink};
pub use profile_store::{InMemoryProfileStore, PostgresProfileStore, ProfileStore};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use router::{Disposition, EventRouter, SyncReport, TriggerHandler};
pub use versioning::VersionSource;
pub use workers::{SyncWorker, SyncWorkerHandle};
