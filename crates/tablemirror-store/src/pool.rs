//! Connection pool lifecycle.
//!
//! One pool per process: acquired on startup, released on shutdown.
//! Nothing in this crate holds ambient global state beyond a pool the
//! caller owns.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Open a pool from the given configuration.
///
/// The configured statement timeout is pushed into every session via
/// the server-side `statement_timeout` setting.
///
/// # Errors
///
/// Returns [`StoreError`] when the URL is malformed or the initial
/// connection fails.
pub async fn connect(config: &StoreConfig) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.database_url)
        .map_err(StoreError::db_context("pool: parse database url"))?
        .options([(
            "statement_timeout",
            config.statement_timeout_ms.to_string(),
        )]);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
        .connect_with(options)
        .await
        .map_err(StoreError::db_context("pool: connect"))?;

    tracing::debug!(
        max_connections = config.max_connections,
        statement_timeout_ms = config.statement_timeout_ms,
        "connection pool opened"
    );
    Ok(pool)
}

/// Close the pool, waiting for checked-out connections to return.
pub async fn close(pool: PgPool) {
    pool.close().await;
    tracing::debug!("connection pool closed");
}
