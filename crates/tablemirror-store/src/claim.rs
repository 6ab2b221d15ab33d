//! Dirty batch claiming.
//!
//! Lets horizontally-scaled push-back workers pull bounded batches of
//! pending changes for one phase without external coordination:
//! row-level locks with `SKIP LOCKED` guarantee two concurrent claims
//! over the same phase never return the same row, and rows dirtied in
//! the meantime are simply picked up by a later claim.

use std::future::Future;

use sqlx::PgPool;
use tablemirror_types::ids::SnapshotId;
use tablemirror_types::record::{PushPhase, StoredRecord};
use tablemirror_types::spec::TableSpec;

use crate::error::{BoxError, Result, StoreError};
use crate::ident::{self, quote};
use crate::value::{decode_record, select_list};

/// SQL predicate selecting rows in one push phase.
///
/// The three phases partition dirty rows: `create` and `delete` key
/// off the reserved metadata markers, `update` is everything dirty
/// with neither marker.
pub(crate) fn phase_predicate(phase: PushPhase) -> &'static str {
    match phase {
        PushPhase::Create => "change_meta ? '__created'",
        PushPhase::Delete => "change_meta ? '__deleted'",
        PushPhase::Update => {
            "NOT (change_meta ? '__created') AND NOT (change_meta ? '__deleted')"
        }
    }
}

/// Claim up to `batch_size` dirty rows for one phase and hand them to
/// `handler`. Returns the number of rows claimed; the caller loops
/// until a claim returns zero.
///
/// The claimed rows are marked clean (dirty flag cleared, metadata
/// emptied) in the same transaction that locks them, and that
/// transaction commits before the handler runs. This is deliberate
/// at-most-once delivery: locks are never held across remote I/O and a
/// crashed worker cannot strand locked rows, but a handler failure
/// after commit leaves the rows already clean — the error propagates
/// as [`StoreError::Handler`] and re-queueing is the caller's job.
///
/// A row skipped because a concurrent claim holds its lock is not an
/// error; it simply isn't part of this batch.
pub(crate) async fn claim_dirty_batch<F, Fut>(
    pool: &PgPool,
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
    ident::validate_table_spec(table)?;
    let table_ref = ident::table_ref(snapshot, &table.name)?;

    let select = format!(
        "SELECT {list} FROM {table_ref} \
         WHERE {dirty} AND {predicate} \
         ORDER BY {ws} \
         LIMIT $1 \
         FOR UPDATE SKIP LOCKED",
        list = select_list(table),
        dirty = quote("dirty"),
        predicate = phase_predicate(phase),
        ws = quote("ws_id"),
    );

    let mut tx = pool
        .begin()
        .await
        .map_err(StoreError::db_context("claim: begin tx"))?;
    let rows = sqlx::query(&select)
        .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::db_context("claim: select batch"))?;

    if rows.is_empty() {
        tx.rollback()
            .await
            .map_err(StoreError::db_context("claim: rollback empty"))?;
        return Ok(0);
    }

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(decode_record(row, table)?);
    }
    let ws_ids: Vec<String> = records.iter().map(|r| r.ws_id.clone()).collect();

    let clear = format!(
        "UPDATE {table_ref} \
         SET {dirty} = FALSE, {meta} = '{{}}'::jsonb \
         WHERE {ws} = ANY($1)",
        dirty = quote("dirty"),
        meta = quote("change_meta"),
        ws = quote("ws_id"),
    );
    sqlx::query(&clear)
        .bind(&ws_ids)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::db_context("claim: clear dirty state"))?;
    tx.commit()
        .await
        .map_err(StoreError::db_context("claim: commit"))?;

    tracing::debug!(
        snapshot = %snapshot,
        table = %table.name,
        phase = %phase,
        claimed = records.len(),
        "claimed dirty batch"
    );

    let claimed = records.len();
    handler(records).await.map_err(StoreError::Handler)?;
    Ok(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_predicates_partition_dirty_rows() {
        assert_eq!(phase_predicate(PushPhase::Create), "change_meta ? '__created'");
        assert_eq!(phase_predicate(PushPhase::Delete), "change_meta ? '__deleted'");
        let update = phase_predicate(PushPhase::Update);
        assert!(update.contains("NOT (change_meta ? '__created')"));
        assert!(update.contains("NOT (change_meta ? '__deleted')"));
    }
}
