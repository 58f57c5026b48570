//! Writes authorization claims onto identity records (the IdentityClaimsWriter).
//!
//! Contract for implementations:
//! - **Whole-set replace**: the stored claims become exactly the given
//!   [`ClaimsSet`]. No field-level merge, no partial application.
//! - **Idempotent**: writing the same set twice is indistinguishable from once.
//! - **Principal must exist**: the identity provider owns principals; writing to
//!   an unknown one is `GatewayError::Rejected`.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use claimsync_auth::ClaimsSet;
use claimsync_core::PrincipalId;

use crate::gateway::GatewayError;

pub use in_memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;

#[async_trait]
pub trait IdentityClaimsWriter: Send + Sync {
    async fn set_claims(
        &self,
        principal_id: &PrincipalId,
        claims: &ClaimsSet,
    ) -> Result<(), GatewayError>;
}

#[async_trait]
impl<W> IdentityClaimsWriter for Arc<W>
where
    W: IdentityClaimsWriter + ?Sized,
{
    async fn set_claims(
        &self,
        principal_id: &PrincipalId,
        claims: &ClaimsSet,
    ) -> Result<(), GatewayError> {
        (**self).set_claims(principal_id, claims).await
    }
}
