use std::sync::Arc;

use async_trait::async_trait;

use claimsync_core::{ExpectedRevision, PrincipalId};

use super::record::GuardRecord;
use crate::gateway::GatewayError;

/// A guard record together with the storage revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGuardRecord {
    pub record: GuardRecord,
    pub revision: u64,
}

/// Durable per-principal guard state with atomic compare-and-swap.
///
/// Implementations must make `compare_and_swap` linearizable per principal:
/// of two swaps expecting the same revision, at most one returns `true`.
#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn load(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<StoredGuardRecord>, GatewayError>;

    /// Replace the record if its revision still matches `expected`.
    ///
    /// Returns `Ok(false)` on a lost race; the caller reloads and decides again.
    async fn compare_and_swap(
        &self,
        principal_id: &PrincipalId,
        expected: ExpectedRevision,
        record: &GuardRecord,
    ) -> Result<bool, GatewayError>;
}

#[async_trait]
impl<V> VersionStore for Arc<V>
where
    V: VersionStore + ?Sized,
{
    async fn load(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<StoredGuardRecord>, GatewayError> {
        (**self).load(principal_id).await
    }

    async fn compare_and_swap(
        &self,
        principal_id: &PrincipalId,
        expected: ExpectedRevision,
        record: &GuardRecord,
    ) -> Result<bool, GatewayError> {
        (**self).compare_and_swap(principal_id, expected, record).await
    }
}
