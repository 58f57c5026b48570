//! Failure injection for the in-memory gateways (tests/dev).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::gateway::GatewayError;

/// Knobs shared by the in-memory stores to simulate a misbehaving remote.
#[derive(Debug, Default)]
pub struct InjectedFaults {
    unavailable: AtomicBool,
    fail_next: AtomicU32,
    latency_ms: AtomicU64,
}

impl InjectedFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `n` calls fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call (before it takes effect).
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub(crate) async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Consume one injected failure, if any is armed.
    pub(crate) fn check(&self, operation: &str) -> Result<(), GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::unavailable(format!("{operation}: injected outage")));
        }
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if armed.is_ok() {
            return Err(GatewayError::unavailable(format!("{operation}: injected failure")));
        }
        Ok(())
    }
}
