//! Identifier validation and physical name derivation.
//!
//! Namespace and table names are derived from caller-supplied
//! snapshot/table identifiers and interpolated into DDL/DML, so every
//! identifier is checked against a strict grammar before any SQL
//! string is built. Validation failure is a hard error, never a
//! sanitization.

use tablemirror_types::ids::SnapshotId;
use tablemirror_types::spec::TableSpec;

use crate::error::{Result, StoreError};

/// Prefix for per-snapshot schema names.
const NAMESPACE_PREFIX: &str = "snap_";

/// Store-managed columns; declared columns must not collide with them.
pub(crate) const RESERVED_COLUMNS: [&str; 4] = ["ws_id", "id", "change_meta", "dirty"];

/// `PostgreSQL` identifier length limit in bytes.
const MAX_IDENT_LEN: usize = 63;

/// Table names leave room for derived index/constraint suffixes
/// (`_dirty_idx`, `_id_key`) within the 63-byte limit.
const MAX_TABLE_LEN: usize = 53;

/// Snapshot ids leave room for the namespace prefix.
const MAX_SNAPSHOT_LEN: usize = MAX_IDENT_LEN - NAMESPACE_PREFIX.len();

fn check_grammar(name: &str, max_len: usize, digits_may_lead: bool) -> Result<()> {
    let fail = |reason: String| StoreError::Identifier {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(fail("must not be empty".into()));
    }
    if name.len() > max_len {
        return Err(fail(format!(
            "exceeds maximum length of {max_len} bytes (got {})",
            name.len()
        )));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        let lead_ok = first.is_ascii_alphabetic()
            || first == '_'
            || (digits_may_lead && first.is_ascii_digit());
        if !lead_ok {
            return Err(fail(format!("must not start with {first:?}")));
        }
    }
    for ch in chars {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            return Err(fail(format!("contains invalid character {ch:?}")));
        }
    }
    Ok(())
}

/// Validate a snapshot identifier.
///
/// Snapshot ids are alphanumeric + underscore and short enough that
/// the prefixed namespace name fits the identifier limit. A leading
/// digit is allowed because the derived name carries the prefix.
pub(crate) fn validate_snapshot(snapshot: &SnapshotId) -> Result<()> {
    check_grammar(snapshot.as_str(), MAX_SNAPSHOT_LEN, true)
}

/// Validate a logical table name.
pub(crate) fn validate_table(name: &str) -> Result<()> {
    check_grammar(name, MAX_TABLE_LEN, false)
}

/// Validate a declared column identifier, including the reserved-name
/// check against store-managed columns.
pub(crate) fn validate_column(id: &str) -> Result<()> {
    check_grammar(id, MAX_IDENT_LEN, false)?;
    if RESERVED_COLUMNS.contains(&id) {
        return Err(StoreError::ReservedColumn(id.to_string()));
    }
    Ok(())
}

/// Validate a whole table specification: table name, every column, and
/// column-id uniqueness. A duplicate id would otherwise surface as an
/// opaque DDL error or a double bind in the upsert statement.
pub(crate) fn validate_table_spec(table: &TableSpec) -> Result<()> {
    validate_table(&table.name)?;
    let mut seen = std::collections::BTreeSet::new();
    for column in &table.columns {
        validate_column(&column.id)?;
        if !seen.insert(column.id.as_str()) {
            return Err(StoreError::Identifier {
                name: column.id.clone(),
                reason: "duplicate column identifier".into(),
            });
        }
    }
    Ok(())
}

/// Derive the schema name for a snapshot, e.g. `snap_conn_42`.
pub(crate) fn namespace(snapshot: &SnapshotId) -> Result<String> {
    validate_snapshot(snapshot)?;
    Ok(format!("{NAMESPACE_PREFIX}{snapshot}"))
}

/// Quote a validated identifier for interpolation.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

/// Fully qualified, quoted table reference, e.g. `"snap_x"."tasks"`.
pub(crate) fn table_ref(snapshot: &SnapshotId, table: &str) -> Result<String> {
    let ns = namespace(snapshot)?;
    validate_table(table)?;
    Ok(format!("{}.{}", quote(&ns), quote(table)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_carries_prefix() {
        let ns = namespace(&SnapshotId::new("conn_42")).unwrap();
        assert_eq!(ns, "snap_conn_42");
    }

    #[test]
    fn snapshot_may_start_with_digit() {
        assert!(validate_snapshot(&SnapshotId::new("42abc")).is_ok());
    }

    #[test]
    fn empty_identifier_rejected() {
        let err = validate_table("").unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");
    }

    #[test]
    fn injection_characters_rejected() {
        for bad in ["tasks; DROP TABLE", "ta\"sks", "ta sks", "snap.x", "t-1"] {
            assert!(validate_table(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn table_may_not_start_with_digit() {
        assert!(validate_table("1tasks").is_err());
    }

    #[test]
    fn length_limits_enforced() {
        assert!(validate_table(&"a".repeat(53)).is_ok());
        assert!(validate_table(&"a".repeat(54)).is_err());
        assert!(validate_snapshot(&SnapshotId::new("a".repeat(58))).is_ok());
        assert!(validate_snapshot(&SnapshotId::new("a".repeat(59))).is_err());
        assert!(validate_column(&"a".repeat(63)).is_ok());
        assert!(validate_column(&"a".repeat(64)).is_err());
    }

    #[test]
    fn reserved_columns_rejected() {
        for reserved in RESERVED_COLUMNS {
            let err = validate_column(reserved).unwrap_err();
            assert!(matches!(err, StoreError::ReservedColumn(_)), "got: {err}");
        }
        assert!(validate_column("title").is_ok());
    }

    #[test]
    fn duplicate_column_ids_rejected() {
        use tablemirror_types::spec::{ColumnSpec, ColumnType};
        let table = TableSpec::new(
            "tasks",
            vec![
                ColumnSpec::new("title", ColumnType::Text),
                ColumnSpec::new("title", ColumnType::Boolean),
            ],
        );
        let err = validate_table_spec(&table).unwrap_err();
        assert!(matches!(err, StoreError::Identifier { .. }), "got: {err}");
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn table_ref_is_quoted_and_qualified() {
        let r = table_ref(&SnapshotId::new("s1"), "tasks").unwrap();
        assert_eq!(r, "\"snap_s1\".\"tasks\"");
    }
}
