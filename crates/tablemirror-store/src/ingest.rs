//! Record ingestion.
//!
//! Merges externally-fetched records into storage, keyed by remote
//! identity. Ingestion reflects the current remote state, not a local
//! edit, so it never touches dirty metadata: a conflicting row gets
//! every declared field overwritten while its `ws_id`, `change_meta`,
//! and `dirty` flag stay exactly as they were.

use sqlx::PgPool;
use tablemirror_types::connector::Connector;
use tablemirror_types::ids::SnapshotId;
use tablemirror_types::record::RemoteRecord;
use tablemirror_types::spec::TableSpec;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::ident::{self, quote};
use crate::value::{bind_field, validate_fields};

/// Upsert statement over every declared column, conflicting on the
/// remote identity.
fn upsert_sql(table_ref: &str, table: &TableSpec) -> String {
    let mut columns = vec![quote("ws_id"), quote("id")];
    columns.extend(table.columns.iter().map(|c| quote(&c.id)));
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    let conflict = if table.columns.is_empty() {
        format!("ON CONFLICT ({}) DO NOTHING", quote("id"))
    } else {
        let updates: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{q} = EXCLUDED.{q}", q = quote(&c.id)))
            .collect();
        format!(
            "ON CONFLICT ({}) DO UPDATE SET {}",
            quote("id"),
            updates.join(", ")
        )
    };

    format!(
        "INSERT INTO {table_ref} ({}) VALUES ({}) {conflict}",
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Merge a batch of remote records into the table.
///
/// Validates every field key against the specification before writing
/// anything: one unknown key rejects the whole batch. All rows are
/// written in a single transaction.
pub(crate) async fn upsert(
    pool: &PgPool,
    snapshot: &SnapshotId,
    table: &TableSpec,
    records: &[RemoteRecord],
) -> Result<u64> {
    ident::validate_table_spec(table)?;
    for record in records {
        validate_fields(table, &record.fields)?;
    }
    if records.is_empty() {
        return Ok(0);
    }

    let table_ref = ident::table_ref(snapshot, &table.name)?;
    let sql = upsert_sql(&table_ref, table);

    let mut tx = pool
        .begin()
        .await
        .map_err(StoreError::db_context("upsert: begin tx"))?;
    for record in records {
        let mut query = sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&record.remote_id);
        for column in &table.columns {
            query = bind_field(query, column, record.fields.get(&column.id))?;
        }
        query
            .execute(&mut *tx)
            .await
            .map_err(StoreError::db_context(format!(
                "upsert: write record {}",
                record.remote_id
            )))?;
    }
    tx.commit()
        .await
        .map_err(StoreError::db_context("upsert: commit"))?;

    tracing::debug!(
        snapshot = %snapshot,
        table = %table.name,
        records = records.len(),
        "upserted remote records"
    );
    Ok(records.len() as u64)
}

/// Drain a connector's paged fetch into [`upsert`], one transaction
/// per page, until the cursor is exhausted. Returns the total number
/// of records ingested.
pub(crate) async fn ingest_from(
    pool: &PgPool,
    snapshot: &SnapshotId,
    table: &TableSpec,
    connector: &dyn Connector,
) -> Result<u64> {
    let mut total = 0u64;
    let mut cursor: Option<String> = None;
    loop {
        let page = connector.fetch_page(table, cursor.as_deref()).await?;
        total += upsert(pool, snapshot, table, &page.records).await?;
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    tracing::info!(
        snapshot = %snapshot,
        table = %table.name,
        records = total,
        "ingestion complete"
    );
    Ok(total)
}
