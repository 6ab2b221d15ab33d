//! Schema provisioning.
//!
//! Ensures a dedicated schema exists per snapshot and that every table
//! in the current specification has a matching physical table. Tables
//! that predate the `ws_id` identity scheme are migrated online:
//! backfill fresh identities, swap the primary key, and enforce
//! uniqueness of the remote identity — without losing a single `id`
//! value. Every step is guarded by a presence check, so a re-run after
//! a partial failure converges instead of erroring.
//!
//! Any DDL failure aborts provisioning for that table; the caller must
//! not assume partial success produced a usable table.

use sqlx::PgPool;
use tablemirror_types::ids::SnapshotId;
use tablemirror_types::spec::TableSpec;

use crate::error::{Result, StoreError};
use crate::ident::{self, quote};
use crate::value::sql_type;

/// Ensure the namespace and every specified table exist.
pub(crate) async fn provision(
    pool: &PgPool,
    snapshot: &SnapshotId,
    tables: &[TableSpec],
) -> Result<()> {
    let ns = ident::namespace(snapshot)?;
    for table in tables {
        ident::validate_table_spec(table)?;
    }

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(&ns)))
        .execute(pool)
        .await
        .map_err(StoreError::db_context(format!(
            "provision: create schema {ns}"
        )))?;

    for table in tables {
        let existing = existing_columns(pool, &ns, &table.name).await?;
        if existing.is_empty() {
            create_table(pool, snapshot, table).await?;
        } else {
            migrate_table(pool, snapshot, table, &existing).await?;
        }
    }
    Ok(())
}

/// Column names currently present, empty when the table does not exist.
async fn existing_columns(pool: &PgPool, ns: &str, table: &str) -> Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind(ns)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(StoreError::db_context(format!(
        "provision: inspect columns of {ns}.{table}"
    )))
}

/// Full CREATE TABLE statement for a fresh table.
fn create_table_ddl(table_ref: &str, table: &TableSpec) -> String {
    let mut parts = vec![
        format!("{} TEXT PRIMARY KEY", quote("ws_id")),
        format!("{} TEXT UNIQUE", quote("id")),
    ];
    parts.extend(
        table
            .columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.id), sql_type(c.data_type))),
    );
    parts.push(format!(
        "{} JSONB NOT NULL DEFAULT '{{}}'::jsonb",
        quote("change_meta")
    ));
    parts.push(format!("{} BOOLEAN NOT NULL DEFAULT FALSE", quote("dirty")));
    format!("CREATE TABLE IF NOT EXISTS {table_ref} ({})", parts.join(", "))
}

/// Partial index over dirty rows, the claim scan's access path.
fn dirty_index_ddl(table_ref: &str, table: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {table_ref} ({}) WHERE {}",
        quote(&format!("{table}_dirty_idx")),
        quote("dirty"),
        quote("dirty"),
    )
}

async fn create_table(pool: &PgPool, snapshot: &SnapshotId, table: &TableSpec) -> Result<()> {
    let table_ref = ident::table_ref(snapshot, &table.name)?;

    sqlx::query(&create_table_ddl(&table_ref, table))
        .execute(pool)
        .await
        .map_err(StoreError::db_context(format!(
            "provision: create table {table_ref}"
        )))?;
    sqlx::query(&dirty_index_ddl(&table_ref, &table.name))
        .execute(pool)
        .await
        .map_err(StoreError::db_context(format!(
            "provision: index table {table_ref}"
        )))?;

    tracing::info!(
        snapshot = %snapshot,
        table = %table.name,
        columns = table.columns.len(),
        "created table"
    );
    Ok(())
}

/// Bring a pre-existing table up to the current layout.
async fn migrate_table(
    pool: &PgPool,
    snapshot: &SnapshotId,
    table: &TableSpec,
    existing: &[String],
) -> Result<()> {
    let table_ref = ident::table_ref(snapshot, &table.name)?;
    let has = |name: &str| existing.iter().any(|c| c == name);

    // Additive columns from a grown specification.
    for column in &table.columns {
        if !has(&column.id) {
            let ddl = format!(
                "ALTER TABLE {table_ref} ADD COLUMN {} {}",
                quote(&column.id),
                sql_type(column.data_type)
            );
            sqlx::query(&ddl).execute(pool).await.map_err(
                StoreError::db_context(format!("migrate: add column {}", column.id)),
            )?;
            tracing::info!(table = %table.name, column = %column.id, "added column");
        }
    }

    if !has("change_meta") {
        let ddl = format!(
            "ALTER TABLE {table_ref} ADD COLUMN {} JSONB NOT NULL DEFAULT '{{}}'::jsonb",
            quote("change_meta")
        );
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .map_err(StoreError::db_context("migrate: add change_meta"))?;
    }
    if !has("dirty") {
        let ddl = format!(
            "ALTER TABLE {table_ref} ADD COLUMN {} BOOLEAN NOT NULL DEFAULT FALSE",
            quote("dirty")
        );
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .map_err(StoreError::db_context("migrate: add dirty"))?;
    }

    if !has("ws_id") {
        migrate_identity(pool, &table_ref, &table.name).await?;
    }

    sqlx::query(&dirty_index_ddl(&table_ref, &table.name))
        .execute(pool)
        .await
        .map_err(StoreError::db_context(format!(
            "migrate: index table {table_ref}"
        )))?;

    Ok(())
}

/// Online migration to the `ws_id` identity scheme.
///
/// Adds a nullable `ws_id`, backfills every row with a fresh unique
/// value, drops the old primary key, then enforces
/// `ws_id NOT NULL PRIMARY KEY` and `id UNIQUE`. Existing `id` values
/// are never touched.
///
/// All steps run in one transaction (`PostgreSQL` DDL is
/// transactional): an interrupted migration rolls back the `ws_id`
/// column itself, so the presence check in [`migrate_table`] routes a
/// re-run through the full migration again instead of skipping a
/// half-migrated table.
async fn migrate_identity(pool: &PgPool, table_ref: &str, table: &str) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(StoreError::db_context("migrate: begin tx"))?;

    sqlx::query(&format!(
        "ALTER TABLE {table_ref} ADD COLUMN {} TEXT",
        quote("ws_id")
    ))
    .execute(&mut *tx)
    .await
    .map_err(StoreError::db_context("migrate: add ws_id"))?;

    let backfilled = sqlx::query(&format!(
        "UPDATE {table_ref} SET {ws} = gen_random_uuid()::text WHERE {ws} IS NULL",
        ws = quote("ws_id")
    ))
    .execute(&mut *tx)
    .await
    .map_err(StoreError::db_context("migrate: backfill ws_id"))?
    .rows_affected();

    // The old primary key (typically on the remote id) must go before
    // ws_id can take over.
    let old_pk: Option<String> = sqlx::query_scalar(
        "SELECT conname FROM pg_constraint \
         WHERE conrelid = ($1)::regclass AND contype = 'p'",
    )
    .bind(table_ref)
    .fetch_optional(&mut *tx)
    .await
    .map_err(StoreError::db_context("migrate: find old primary key"))?;

    if let Some(conname) = old_pk {
        sqlx::query(&format!(
            "ALTER TABLE {table_ref} DROP CONSTRAINT {}",
            quote(&conname)
        ))
        .execute(&mut *tx)
        .await
        .map_err(StoreError::db_context("migrate: drop old primary key"))?;
    }

    sqlx::query(&format!(
        "ALTER TABLE {table_ref} ALTER COLUMN {} SET NOT NULL",
        quote("ws_id")
    ))
    .execute(&mut *tx)
    .await
    .map_err(StoreError::db_context("migrate: ws_id not null"))?;

    sqlx::query(&format!(
        "ALTER TABLE {table_ref} ADD PRIMARY KEY ({})",
        quote("ws_id")
    ))
    .execute(&mut *tx)
    .await
    .map_err(StoreError::db_context("migrate: ws_id primary key"))?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table_ref} ({})",
        quote(&format!("{table}_id_key")),
        quote("id")
    ))
    .execute(&mut *tx)
    .await
    .map_err(StoreError::db_context("migrate: id unique index"))?;

    tx.commit()
        .await
        .map_err(StoreError::db_context("migrate: commit"))?;

    tracing::info!(table = %table, backfilled, "migrated table to ws_id identity");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemirror_types::spec::{ColumnSpec, ColumnType};

    #[test]
    fn create_table_ddl_lists_all_columns() {
        let table = TableSpec::new(
            "tasks",
            vec![
                ColumnSpec::new("title", ColumnType::Text),
                ColumnSpec::new("done", ColumnType::Boolean),
            ],
        );
        let ddl = create_table_ddl("\"snap_s\".\"tasks\"", &table);
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"snap_s\".\"tasks\" (\
             \"ws_id\" TEXT PRIMARY KEY, \
             \"id\" TEXT UNIQUE, \
             \"title\" TEXT, \
             \"done\" BOOLEAN, \
             \"change_meta\" JSONB NOT NULL DEFAULT '{}'::jsonb, \
             \"dirty\" BOOLEAN NOT NULL DEFAULT FALSE)"
        );
    }

    #[test]
    fn dirty_index_ddl_is_partial() {
        let ddl = dirty_index_ddl("\"snap_s\".\"tasks\"", "tasks");
        assert_eq!(
            ddl,
            "CREATE INDEX IF NOT EXISTS \"tasks_dirty_idx\" \
             ON \"snap_s\".\"tasks\" (\"dirty\") WHERE \"dirty\""
        );
    }
}
