//! Read access to profile documents (the ProfileStore gateway).
//!
//! A point lookup by principal id, nothing more. Reads may be eventually
//! consistent: the sync pipeline is idempotent and monotonic, so a slightly old
//! read can only lose a version race, never regress claims.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use claimsync_auth::ProfileRecord;
use claimsync_core::PrincipalId;

use crate::gateway::GatewayError;

pub use in_memory::InMemoryProfileStore;
pub use postgres::PostgresProfileStore;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the current profile; `Ok(None)` when the principal has none yet.
    async fn fetch(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<ProfileRecord>, GatewayError>;
}

#[async_trait]
impl<S> ProfileStore for Arc<S>
where
    S: ProfileStore + ?Sized,
{
    async fn fetch(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<ProfileRecord>, GatewayError> {
        (**self).fetch(principal_id).await
    }
}
