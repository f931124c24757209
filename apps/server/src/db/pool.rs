//! Connection pool and migrations

use crate::{config::DatabaseConfig, Error, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Which process the pool serves. Workers need fewer connections than the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRole {
    Server,
    Worker,
}

pub async fn create_pool(config: &DatabaseConfig, role: PoolRole) -> Result<PgPool> {
    let (min, max, acquire_timeout) = match role {
        PoolRole::Server => (
            config.pool_min_size,
            config.pool_max_size,
            config.pool_timeout_seconds,
        ),
        PoolRole::Worker => (
            config.worker_pool_min_size,
            config.worker_pool_max_size,
            config.worker_pool_timeout_seconds,
        ),
    };

    let statement_timeout = config.statement_timeout_seconds;
    let lock_timeout = config.lock_timeout_seconds;

    let pool = PgPoolOptions::new()
        .min_connections(min)
        .max_connections(max)
        .acquire_timeout(Duration::from_secs(acquire_timeout))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                    .execute(&mut *conn)
                    .await?;

                // Fail fast on lock contention
                sqlx::query(&format!("SET lock_timeout = '{}s'", lock_timeout))
                    .execute(&mut *conn)
                    .await?;

                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(Error::Database)?;

    tracing::info!(role = ?role, min, max, "Database pool created");
    Ok(pool)
}

/// Apply pending migrations. Safe to run from every process.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| match e {
            sqlx::migrate::MigrateError::Execute(db_err) => Error::Database(db_err),
            other => Error::Internal(format!("Migration failed: {}", other)),
        })
}
