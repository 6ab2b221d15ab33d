//! The snapshot store facade.

use std::future::Future;

use sqlx::PgPool;
use tablemirror_types::connector::{Connector, RemoteIdAssignment};
use tablemirror_types::ids::SnapshotId;
use tablemirror_types::record::{Mutation, PushPhase, RemoteRecord, StoredRecord};
use tablemirror_types::spec::TableSpec;

use crate::config::StoreConfig;
use crate::error::{BoxError, Result, StoreError};
use crate::ident::{self, quote};
use crate::value::{decode_record, select_list};
use crate::{claim, ingest, mutate, pool, reconcile, schema};

/// Per-connection snapshot record store over a shared `PostgreSQL`
/// pool.
///
/// One `SnapshotStore` per process is the intended shape: the pool is
/// acquired on startup ([`SnapshotStore::connect`]) and released on
/// shutdown ([`SnapshotStore::close`]). The handle is cheap to clone;
/// clones share the pool.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: PgPool,
}

impl SnapshotStore {
    /// Open a store from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the connection cannot be
    /// established.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            pool: pool::connect(config).await?,
        })
    }

    /// Wrap an existing pool (shared with other subsystems or tests).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(self) {
        pool::close(self.pool).await;
    }

    /// Ensure the snapshot's namespace and every specified table
    /// exist, migrating pre-existing tables to the current layout.
    ///
    /// # Errors
    ///
    /// Any DDL failure aborts provisioning for that table; partial
    /// success must not be assumed usable.
    pub async fn provision(&self, snapshot: &SnapshotId, tables: &[TableSpec]) -> Result<()> {
        schema::provision(&self.pool, snapshot, tables).await
    }

    /// Merge externally-fetched records, keyed by remote identity.
    /// Conflicting rows keep their `ws_id` and dirty state; every
    /// declared field is overwritten. Returns the record count.
    ///
    /// # Errors
    ///
    /// Rejects the entire batch on the first field key that is not a
    /// declared column.
    pub async fn upsert(
        &self,
        snapshot: &SnapshotId,
        table: &TableSpec,
        records: &[RemoteRecord],
    ) -> Result<u64> {
        ingest::upsert(&self.pool, snapshot, table, records).await
    }

    /// Drain a connector's paged fetch into the table. Returns the
    /// total number of records ingested.
    ///
    /// # Errors
    ///
    /// Propagates connector fetch failures and upsert failures.
    pub async fn ingest_from(
        &self,
        snapshot: &SnapshotId,
        table: &TableSpec,
        connector: &dyn Connector,
    ) -> Result<u64> {
        ingest::ingest_from(&self.pool, snapshot, table, connector).await
    }

    /// Page through a table in remote-identity order (locally created,
    /// id-less rows sort last). `offset` is a plain row offset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn list(
        &self,
        snapshot: &SnapshotId,
        table: &TableSpec,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StoredRecord>> {
        ident::validate_table_spec(table)?;
        let table_ref = ident::table_ref(snapshot, &table.name)?;
        let sql = format!(
            "SELECT {list} FROM {table_ref} \
             ORDER BY {id} ASC NULLS LAST, {ws} ASC \
             OFFSET $1 LIMIT $2",
            list = select_list(table),
            id = quote("id"),
            ws = quote("ws_id"),
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::db_context("list: select page"))?;
        rows.iter().map(|row| decode_record(row, table)).collect()
    }

    /// Apply an ordered batch of mutations atomically, recording
    /// field-level change timestamps. Returns the operation count.
    ///
    /// # Errors
    ///
    /// An unknown field key or `ws_id` aborts and rolls back the
    /// whole batch.
    pub async fn apply_mutations(
        &self,
        snapshot: &SnapshotId,
        table: &TableSpec,
        ops: &[Mutation],
    ) -> Result<usize> {
        mutate::apply_mutations(&self.pool, snapshot, table, ops).await
    }

    /// Claim up to `batch_size` dirty rows for one push phase and hand
    /// them to `handler`; loop until this returns zero to drain the
    /// phase.
    ///
    /// Concurrent claims never receive overlapping rows. Delivery is
    /// at-most-once: the rows are committed clean before the handler
    /// runs, so a handler failure surfaces as
    /// [`StoreError::Handler`] with the rows already unmarked — see
    /// the module docs of [`crate::claim`] for the rationale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure or when the handler
    /// fails.
    pub async fn claim_dirty_batch<F, Fut>(
        &self,
        snapshot: &SnapshotId,
        table: &TableSpec,
        phase: PushPhase,
        batch_size: usize,
        handler: F,
    ) -> Result<usize>
    where
        F: FnOnce(Vec<StoredRecord>) -> Fut,
        Fut: Future<Output = std::result::Result<(), BoxError>>,
    {
        claim::claim_dirty_batch(&self.pool, snapshot, table, phase, batch_size, handler).await
    }

    /// Record the remote identities assigned to locally created rows.
    /// Dirty metadata is untouched. Returns the rows updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn assign_remote_ids(
        &self,
        snapshot: &SnapshotId,
        table: &str,
        pairs: &[RemoteIdAssignment],
    ) -> Result<u64> {
        reconcile::assign_remote_ids(&self.pool, snapshot, table, pairs).await
    }

    /// Physically remove rows whose remote deletion is confirmed.
    /// Returns the rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn hard_delete(
        &self,
        snapshot: &SnapshotId,
        table: &str,
        ws_ids: &[String],
    ) -> Result<u64> {
        reconcile::hard_delete(&self.pool, snapshot, table, ws_ids).await
    }

    /// Drop the snapshot's entire storage namespace. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn teardown(&self, snapshot: &SnapshotId) -> Result<()> {
        reconcile::teardown(&self.pool, snapshot).await
    }
}
