//! User-originated mutations.
//!
//! Applies an ordered batch of create/update/delete operations in a
//! single transaction and records field-level change timestamps in
//! dirty metadata. The metadata merge is read-modify-write under a row
//! lock, using the keep-latest union from
//! [`ChangeMeta`](tablemirror_types::record::ChangeMeta) rather than a
//! database-specific JSON operator.

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tablemirror_types::ids::SnapshotId;
use tablemirror_types::record::{ChangeMeta, Fields, Mutation};
use tablemirror_types::spec::TableSpec;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::ident::{self, quote};
use crate::value::{bind_field, now_iso, validate_fields};

/// Apply a batch of mutations atomically. Returns the number of
/// operations applied.
///
/// Field keys of every operation are validated against the
/// specification before the transaction starts; an unknown `ws_id`
/// in an update or delete aborts and rolls back the whole batch.
pub(crate) async fn apply_mutations(
    pool: &PgPool,
    snapshot: &SnapshotId,
    table: &TableSpec,
    ops: &[Mutation],
) -> Result<usize> {
    ident::validate_table_spec(table)?;
    for op in ops {
        match op {
            Mutation::Create { data } | Mutation::Update { data, .. } => {
                validate_fields(table, data)?;
            }
            Mutation::Delete { .. } => {}
        }
    }
    if ops.is_empty() {
        return Ok(0);
    }

    let table_ref = ident::table_ref(snapshot, &table.name)?;
    let now = now_iso();

    let mut tx = pool
        .begin()
        .await
        .map_err(StoreError::db_context("mutate: begin tx"))?;
    for op in ops {
        match op {
            Mutation::Create { data } => create(&mut tx, &table_ref, table, data, &now).await?,
            Mutation::Update { ws_id, data } => {
                update(&mut tx, &table_ref, table, ws_id, data, &now).await?;
            }
            Mutation::Delete { ws_id } => delete(&mut tx, &table_ref, table, ws_id, &now).await?,
        }
    }
    tx.commit()
        .await
        .map_err(StoreError::db_context("mutate: commit"))?;

    tracing::debug!(
        snapshot = %snapshot,
        table = %table.name,
        ops = ops.len(),
        "applied mutations"
    );
    Ok(ops.len())
}

/// Insert a locally created record: fresh `ws_id`, no remote identity,
/// `__created` marker set.
async fn create(
    tx: &mut Transaction<'_, Postgres>,
    table_ref: &str,
    table: &TableSpec,
    data: &Fields,
    now: &str,
) -> Result<()> {
    let mut meta = ChangeMeta::new();
    meta.mark_created(now);

    let mut columns = vec![quote("ws_id"), quote("id"), quote("change_meta"), quote("dirty")];
    columns.extend(table.columns.iter().map(|c| quote(&c.id)));
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "INSERT INTO {table_ref} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(Option::<String>::None)
        .bind(serde_json::to_value(&meta)?)
        .bind(true);
    for column in &table.columns {
        query = bind_field(query, column, data.get(&column.id))?;
    }
    query
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db_context("mutate: create record"))?;
    Ok(())
}

/// Lock a row and return its current dirty metadata.
async fn lock_meta(
    tx: &mut Transaction<'_, Postgres>,
    table_ref: &str,
    table: &TableSpec,
    ws_id: &str,
) -> Result<ChangeMeta> {
    let sql = format!(
        "SELECT {meta} FROM {table_ref} WHERE {ws} = $1 FOR UPDATE",
        meta = quote("change_meta"),
        ws = quote("ws_id")
    );
    let current: Option<Value> = sqlx::query_scalar(&sql)
        .bind(ws_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(StoreError::db_context("mutate: lock record"))?;
    match current {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Err(StoreError::RecordNotFound {
            table: table.name.clone(),
            ws_id: ws_id.to_string(),
        }),
    }
}

/// Overwrite the given fields and merge their edit timestamps into the
/// existing metadata. Fields absent from `data` keep both their value
/// and their prior timestamp. An update with no fields validates the
/// `ws_id` and writes nothing: setting the dirty flag without a
/// metadata entry would break the dirty ⇔ non-empty-metadata
/// invariant and feed phantom rows to the update-phase claimer.
async fn update(
    tx: &mut Transaction<'_, Postgres>,
    table_ref: &str,
    table: &TableSpec,
    ws_id: &str,
    data: &Fields,
    now: &str,
) -> Result<()> {
    let mut meta = lock_meta(tx, table_ref, table, ws_id).await?;
    if data.is_empty() {
        return Ok(());
    }
    for key in data.keys() {
        meta.touch(key, now);
    }

    let touched: Vec<&str> = data.keys().map(String::as_str).collect();
    let mut assignments: Vec<String> = touched
        .iter()
        .enumerate()
        .map(|(i, key)| format!("{} = ${}", quote(key), i + 1))
        .collect();
    assignments.push(format!("{} = ${}", quote("change_meta"), touched.len() + 1));
    assignments.push(format!("{} = TRUE", quote("dirty")));
    let sql = format!(
        "UPDATE {table_ref} SET {} WHERE {} = ${}",
        assignments.join(", "),
        quote("ws_id"),
        touched.len() + 2
    );

    let mut query = sqlx::query(&sql);
    for key in &touched {
        let column = table.column(key).ok_or_else(|| StoreError::UnknownColumn {
            table: table.name.clone(),
            column: (*key).to_string(),
        })?;
        query = bind_field(query, column, data.get(*key))?;
    }
    query = query.bind(serde_json::to_value(&meta)?).bind(ws_id);
    query
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db_context("mutate: update record"))?;
    Ok(())
}

/// Soft-delete: set the `__deleted` marker and keep the row so the
/// push-back worker can still identify what is being deleted.
async fn delete(
    tx: &mut Transaction<'_, Postgres>,
    table_ref: &str,
    table: &TableSpec,
    ws_id: &str,
    now: &str,
) -> Result<()> {
    let mut meta = lock_meta(tx, table_ref, table, ws_id).await?;
    meta.mark_deleted(now);

    let sql = format!(
        "UPDATE {table_ref} SET {meta} = $1, {dirty} = TRUE WHERE {ws} = $2",
        meta = quote("change_meta"),
        dirty = quote("dirty"),
        ws = quote("ws_id")
    );
    sqlx::query(&sql)
        .bind(serde_json::to_value(&meta)?)
        .bind(ws_id)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db_context("mutate: delete record"))?;
    Ok(())
}
