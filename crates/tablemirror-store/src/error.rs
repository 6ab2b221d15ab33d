//! Store error types.

/// Boxed error returned by a caller-supplied push handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by snapshot store operations.
///
/// The store never swallows failures; everything propagates to the
/// caller. A skipped locked row during a claim is not an error and
/// has no variant here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `PostgreSQL` failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `PostgreSQL` failure with operation context.
    #[error("{context}: {source}")]
    DatabaseContext {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Caller-supplied name failed the strict identifier grammar.
    #[error("invalid identifier {name:?}: {reason}")]
    Identifier { name: String, reason: String },

    /// A field key does not name a declared column. Fails the whole
    /// batch — treated as a connector bug, not a transient condition.
    #[error("unknown column {column:?} in table {table:?}")]
    UnknownColumn { table: String, column: String },

    /// A declared column identifier collides with a store-managed column.
    #[error("column name {0:?} is reserved")]
    ReservedColumn(String),

    /// A value is incompatible with its column's declared type.
    #[error("column {column:?} expects {expected}")]
    ValueType {
        column: String,
        expected: &'static str,
    },

    /// An update or delete named a `ws_id` with no matching row.
    #[error("record {ws_id:?} not found in table {table:?}")]
    RecordNotFound { table: String, ws_id: String },

    /// Invalid store configuration.
    #[error("invalid store config: {0}")]
    Config(String),

    /// Remote fetch failed while driving ingestion.
    #[error("connector error: {0}")]
    Connector(#[from] tablemirror_types::connector::ConnectorError),

    /// Dirty-metadata JSON could not be encoded or decoded.
    #[error("metadata encoding failed: {0}")]
    Meta(#[from] serde_json::Error),

    /// The caller-supplied push handler failed after the batch was
    /// claimed and committed clean.
    #[error("push handler failed: {0}")]
    Handler(#[source] BoxError),
}

impl StoreError {
    /// Wrap an `sqlx` error with operation context.
    pub(crate) fn db_context(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |source| Self::DatabaseContext { context, source }
    }

    /// Wrap a push handler failure.
    #[must_use]
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_sqlx_error() {
        let err = StoreError::db_context("provision: create schema")(sqlx::Error::PoolClosed);
        let msg = err.to_string();
        assert!(msg.contains("provision: create schema"), "got: {msg}");
    }

    #[test]
    fn unknown_column_display() {
        let err = StoreError::UnknownColumn {
            table: "tasks".into(),
            column: "ghost".into(),
        };
        assert_eq!(err.to_string(), "unknown column \"ghost\" in table \"tasks\"");
    }

    #[test]
    fn handler_error_preserves_source() {
        let err = StoreError::handler("remote push rejected");
        assert!(err.to_string().contains("push handler failed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
