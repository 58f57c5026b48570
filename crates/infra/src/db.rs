//! Postgres connection pools and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::gateway::{GatewayError, map_sqlx_error};

/// Tables used by the Postgres gateways. Every statement is idempotent.
pub const SCHEMA: &str = include_str!("../migrations/0001_sync.sql");

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, GatewayError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Create any missing tables.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), GatewayError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("schema bootstrap", e))?;
    info!("sync schema ready");
    Ok(())
}
