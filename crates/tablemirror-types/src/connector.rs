//! Connector boundary.
//!
//! A [`Connector`] talks to one external service (Notion, Airtable,
//! Shopify, ...): it parses the remote schema into [`TableSpec`]s,
//! fetches records page by page, and writes accepted local edits back.
//! Concrete connectors live outside this workspace; only the contract
//! and its error model are defined here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::{RemoteRecord, StoredRecord};
use crate::spec::TableSpec;

/// Broad classification of a connector failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ConnectorErrorKind {
    /// Authentication failure (expired or revoked token).
    Auth,
    /// Rate limit exceeded (retryable).
    RateLimit,
    /// Transient network error (retryable).
    TransientNetwork,
    /// Invalid or corrupt remote data.
    Data,
    /// Remote schema mismatch or incompatibility.
    Schema,
    /// Internal connector error.
    Internal,
}

impl std::fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::TransientNetwork => "transient_network",
            Self::Data => "data",
            Self::Schema => "schema",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured error from a connector operation.
///
/// Construct via the kind-specific factory methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct ConnectorError {
    pub kind: ConnectorErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ConnectorError {
    fn new(kind: ConnectorErrorKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Authentication error (not retryable).
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Auth, false, message)
    }

    /// Rate limit error (retryable).
    #[must_use]
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::RateLimit, true, message)
    }

    /// Transient network error (retryable).
    #[must_use]
    pub fn transient_network(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::TransientNetwork, true, message)
    }

    /// Remote data error (not retryable).
    #[must_use]
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Data, false, message)
    }

    /// Remote schema error (not retryable).
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Schema, false, message)
    }

    /// Internal connector error (not retryable).
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ConnectorErrorKind::Internal, false, message)
    }
}

/// One page of a remote fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchPage {
    /// Records in this page.
    pub records: Vec<RemoteRecord>,
    /// Opaque cursor for the next page; `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Remote identity assigned to a locally created record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdAssignment {
    /// Local primary identity of the created record.
    pub ws_id: String,
    /// Identity the remote service assigned.
    pub remote_id: String,
}

/// Contract for one external-service integration.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn Connector>`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Parse the remote schema into table specifications.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the remote schema cannot be
    /// fetched or parsed.
    async fn discover(&self) -> Result<Vec<TableSpec>, ConnectorError>;

    /// Fetch one page of records for `table`, resuming at `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] on remote fetch failure.
    async fn fetch_page(
        &self,
        table: &TableSpec,
        cursor: Option<&str>,
    ) -> Result<FetchPage, ConnectorError>;

    /// Create locally originated records remotely, returning the
    /// identities the remote service assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] on remote write failure.
    async fn create_records(
        &self,
        table: &TableSpec,
        records: &[StoredRecord],
    ) -> Result<Vec<RemoteIdAssignment>, ConnectorError>;

    /// Push field updates for records that already exist remotely.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] on remote write failure.
    async fn update_records(
        &self,
        table: &TableSpec,
        records: &[StoredRecord],
    ) -> Result<(), ConnectorError>;

    /// Delete records remotely by remote identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] on remote write failure.
    async fn delete_records(
        &self,
        table: &TableSpec,
        remote_ids: &[String],
    ) -> Result<(), ConnectorError>;
}
