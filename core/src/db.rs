use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Create a connection pool from the database section of the config.
///
/// Connections are only borrowed for the duration of a slice, so a small pool
/// is enough even when several passes run side by side.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config
        .url
        .as_deref()
        .context("Database URL validated by config loading")?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(url)
        .await
        .context("Failed to connect to database")
}

/// Fail early if the `page` table isn't there.
pub async fn check_page_table(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1 FROM page LIMIT 1")
        .execute(pool)
        .await
        .context("Database has no readable `page` table")?;
    Ok(())
}
