//! Postgres-backed guard state.
//!
//! One row per principal in `sync_versions (principal_id TEXT PRIMARY KEY,
//! record JSONB NOT NULL, revision BIGINT NOT NULL)`. The first swap is an
//! `INSERT .. ON CONFLICT DO NOTHING`, later ones an `UPDATE .. WHERE revision = $n`;
//! in both cases zero affected rows means another writer got there first.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use claimsync_core::{ExpectedRevision, PrincipalId};

use super::record::GuardRecord;
use super::store::{StoredGuardRecord, VersionStore};
use crate::gateway::{GatewayError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresVersionStore {
    pool: Arc<PgPool>,
}

impl PostgresVersionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn to_db_revision(revision: u64) -> Result<i64, GatewayError> {
    i64::try_from(revision)
        .map_err(|_| GatewayError::malformed(format!("revision {revision} out of range")))
}

#[async_trait]
impl VersionStore for PostgresVersionStore {
    #[instrument(skip(self), fields(principal_id = %principal_id), err)]
    async fn load(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<StoredGuardRecord>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT record, revision
            FROM sync_versions
            WHERE principal_id = $1
            "#,
        )
        .bind(principal_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("guard load", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(record): Json<GuardRecord> = row
            .try_get("record")
            .map_err(|e| map_sqlx_error("guard load", e))?;
        let revision: i64 = row
            .try_get("revision")
            .map_err(|e| map_sqlx_error("guard load", e))?;
        let revision = u64::try_from(revision)
            .map_err(|_| GatewayError::malformed(format!("negative guard revision {revision}")))?;

        Ok(Some(StoredGuardRecord { record, revision }))
    }

    #[instrument(
        skip(self, record),
        fields(principal_id = %principal_id, version = %record.version),
        err
    )]
    async fn compare_and_swap(
        &self,
        principal_id: &PrincipalId,
        expected: ExpectedRevision,
        record: &GuardRecord,
    ) -> Result<bool, GatewayError> {
        let next = to_db_revision(expected.next())?;

        let result = match expected {
            ExpectedRevision::Absent => {
                sqlx::query(
                    r#"
                    INSERT INTO sync_versions (principal_id, record, revision)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (principal_id) DO NOTHING
                    "#,
                )
                .bind(principal_id.as_str())
                .bind(Json(record))
                .bind(next)
                .execute(&*self.pool)
                .await
            }
            ExpectedRevision::Exact(current) => {
                sqlx::query(
                    r#"
                    UPDATE sync_versions
                    SET record = $2, revision = $3
                    WHERE principal_id = $1 AND revision = $4
                    "#,
                )
                .bind(principal_id.as_str())
                .bind(Json(record))
                .bind(next)
                .bind(to_db_revision(current)?)
                .execute(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("guard swap", e))?;

        Ok(result.rows_affected() == 1)
    }
}
