//! Postgres-backed profile reads.
//!
//! Profiles live in `profiles (principal_id TEXT PRIMARY KEY, document JSONB,
//! revision BIGINT, updated_at TIMESTAMPTZ)`. The row's `revision` and
//! `updated_at` columns are authoritative and override whatever the document
//! itself claims.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use claimsync_auth::ProfileRecord;
use claimsync_core::PrincipalId;

use super::ProfileStore;
use crate::gateway::{GatewayError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresProfileStore {
    pool: Arc<PgPool>,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn fetch(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<ProfileRecord>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT document, revision, updated_at
            FROM profiles
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("profile fetch", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(mut document): Json<JsonValue> = row
            .try_get("document")
            .map_err(|e| map_sqlx_error("profile fetch", e))?;
        let revision: Option<i64> = row
            .try_get("revision")
            .map_err(|e| map_sqlx_error("profile fetch", e))?;
        let updated_at: Option<DateTime<Utc>> = row
            .try_get("updated_at")
            .map_err(|e| map_sqlx_error("profile fetch", e))?;

        // Documents written by the dashboard do not always carry their own id.
        if let JsonValue::Object(fields) = &mut document {
            fields
                .entry("principalId")
                .or_insert_with(|| JsonValue::String(principal_id.to_string()));
        }

        let mut profile: ProfileRecord = serde_json::from_value(document).map_err(|e| {
            GatewayError::malformed(format!("profile document for {principal_id}: {e}"))
        })?;

        if profile.principal_id != *principal_id {
            return Err(GatewayError::malformed(format!(
                "profile row {principal_id} holds a document for {}",
                profile.principal_id
            )));
        }

        if let Some(rev) = revision {
            let rev = u64::try_from(rev)
                .map_err(|_| GatewayError::malformed(format!("negative revision {rev}")))?;
            profile.revision = Some(rev);
        }
        if updated_at.is_some() {
            profile.updated_at = updated_at;
        }

        Ok(Some(profile))
    }
}
