//! Postgres-backed identity claims.
//!
//! Principals live in `identity_principals (principal_id TEXT PRIMARY KEY,
//! claims JSONB, claims_updated_at TIMESTAMPTZ)`, rows owned by the identity
//! provider. This writer only ever replaces the `claims` column, in a single
//! statement, so a failed write leaves the previous set intact.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use claimsync_auth::ClaimsSet;
use claimsync_core::PrincipalId;

use super::IdentityClaimsWriter;
use crate::gateway::{GatewayError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl IdentityClaimsWriter for PostgresIdentityStore {
    #[instrument(
        skip(self, claims),
        fields(principal_id = %principal_id, role = %claims.role),
        err
    )]
    async fn set_claims(
        &self,
        principal_id: &PrincipalId,
        claims: &ClaimsSet,
    ) -> Result<(), GatewayError> {
        let result = sqlx::query(
            r#"
            UPDATE identity_principals
            SET claims = $2, claims_updated_at = NOW()
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id.as_str())
        .bind(Json(claims))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claims write", e))?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::rejected(format!("unknown principal {principal_id}")));
        }
        Ok(())
    }
}
