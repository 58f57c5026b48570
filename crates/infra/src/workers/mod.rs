//! Background consumers of the trigger bus.

pub mod sync_worker;

pub use sync_worker::{DeadLetter, SyncWorker, SyncWorkerHandle, WorkerStats};
