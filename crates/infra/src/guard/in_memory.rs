use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use claimsync_core::{ExpectedRevision, PrincipalId};

use super::record::GuardRecord;
use super::store::{StoredGuardRecord, VersionStore};
use crate::faults::InjectedFaults;
use crate::gateway::GatewayError;

/// In-memory guard state.
///
/// Intended for tests/dev. The revision check and the write happen under one
/// write lock, which is what makes the swap atomic.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    records: RwLock<HashMap<PrincipalId, StoredGuardRecord>>,
    faults: InjectedFaults,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &InjectedFaults {
        &self.faults
    }

    /// Snapshot of the current record, for assertions.
    pub fn snapshot(&self, principal_id: &PrincipalId) -> Option<GuardRecord> {
        let records = self.records.read().ok()?;
        records.get(principal_id).map(|stored| stored.record.clone())
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn load(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<StoredGuardRecord>, GatewayError> {
        self.faults.delay().await;
        self.faults.check("guard load")?;

        let records = self
            .records
            .read()
            .map_err(|_| GatewayError::unavailable("version store lock poisoned"))?;
        Ok(records.get(principal_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        principal_id: &PrincipalId,
        expected: ExpectedRevision,
        record: &GuardRecord,
    ) -> Result<bool, GatewayError> {
        self.faults.delay().await;
        self.faults.check("guard swap")?;

        let mut records = self
            .records
            .write()
            .map_err(|_| GatewayError::unavailable("version store lock poisoned"))?;

        let actual = records.get(principal_id).map(|stored| stored.revision);
        if expected.check(actual).is_err() {
            return Ok(false);
        }

        records.insert(
            principal_id.clone(),
            StoredGuardRecord {
                record: record.clone(),
                revision: expected.next(),
            },
        );
        Ok(true)
    }
}
