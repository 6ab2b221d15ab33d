//! Store configuration.

use serde::Deserialize;

use crate::error::{Result, StoreError};

fn default_max_connections() -> u32 {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_statement_timeout_ms() -> u64 {
    30_000
}

/// Connection settings for the snapshot store.
///
/// The statement timeout is applied to every pooled session so each
/// database round-trip has an explicit upper bound; the driver
/// enforces nothing on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `PostgreSQL` connection URL, e.g.
    /// `postgres://tablemirror@localhost/tablemirror`.
    pub database_url: String,
    /// Maximum pooled connections for this process.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long to wait for a free pooled connection.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Server-side `statement_timeout` for every session.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl StoreConfig {
    /// Config with defaults for everything but the URL.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }

    /// Read the connection URL from `DATABASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Config("DATABASE_URL is not set".into()))?;
        Ok(Self::new(url))
    }
}
