//! Identity reconciliation and cleanup.
//!
//! After a push-back succeeds, locally-assigned identities are paired
//! with the identities the remote service handed out, confirmed
//! deletions are physically removed, and a snapshot's whole namespace
//! can be torn down.

use sqlx::PgPool;
use tablemirror_types::connector::RemoteIdAssignment;
use tablemirror_types::ids::SnapshotId;

use crate::error::{Result, StoreError};
use crate::ident::{self, quote};

/// Set the remote identity for each `(ws_id, remote_id)` pair,
/// typically after a successful remote create. Dirty metadata is left
/// untouched. Returns the number of rows updated.
pub(crate) async fn assign_remote_ids(
    pool: &PgPool,
    snapshot: &SnapshotId,
    table: &str,
    pairs: &[RemoteIdAssignment],
) -> Result<u64> {
    let table_ref = ident::table_ref(snapshot, table)?;
    if pairs.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "UPDATE {table_ref} SET {id} = $1 WHERE {ws} = $2",
        id = quote("id"),
        ws = quote("ws_id")
    );

    let mut tx = pool
        .begin()
        .await
        .map_err(StoreError::db_context("reconcile: begin tx"))?;
    let mut updated = 0u64;
    for pair in pairs {
        updated += sqlx::query(&sql)
            .bind(&pair.remote_id)
            .bind(&pair.ws_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::db_context(format!(
                "reconcile: assign remote id to {}",
                pair.ws_id
            )))?
            .rows_affected();
    }
    tx.commit()
        .await
        .map_err(StoreError::db_context("reconcile: commit"))?;

    tracing::debug!(snapshot = %snapshot, table, updated, "assigned remote ids");
    Ok(updated)
}

/// Physically remove rows after a remote deletion is confirmed.
/// Returns the number of rows deleted.
pub(crate) async fn hard_delete(
    pool: &PgPool,
    snapshot: &SnapshotId,
    table: &str,
    ws_ids: &[String],
) -> Result<u64> {
    let table_ref = ident::table_ref(snapshot, table)?;
    if ws_ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "DELETE FROM {table_ref} WHERE {ws} = ANY($1)",
        ws = quote("ws_id")
    );
    let deleted = sqlx::query(&sql)
        .bind(ws_ids)
        .execute(pool)
        .await
        .map_err(StoreError::db_context("reconcile: hard delete"))?
        .rows_affected();

    tracing::debug!(snapshot = %snapshot, table, deleted, "hard-deleted rows");
    Ok(deleted)
}

/// Drop the snapshot's entire namespace and everything in it.
/// Irreversible.
pub(crate) async fn teardown(pool: &PgPool, snapshot: &SnapshotId) -> Result<()> {
    let ns = ident::namespace(snapshot)?;
    let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", quote(&ns));
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(StoreError::db_context(format!("teardown: drop schema {ns}")))?;

    tracing::info!(snapshot = %snapshot, "tore down snapshot storage");
    Ok(())
}
