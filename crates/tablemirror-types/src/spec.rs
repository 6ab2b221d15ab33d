//! Table specifications.
//!
//! A [`TableSpec`] is the parsed shape of one remote table as supplied
//! by the connector layer: a name plus an ordered column list. Column
//! identifiers are the stable local ids ("wsIds") the remote schema
//! parser assigned; they double as physical column names in storage.
//! Specifications are append-only in practice — connectors may add
//! columns over time but never remove them through this store.

use serde::{Deserialize, Serialize};

/// Declared type of a column.
///
/// Closed set on purpose: the store maps each variant to a physical
/// SQL type with an exhaustive match, so adding a variant here without
/// updating the mapper is a build error rather than a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    TextArray,
    Number,
    NumberArray,
    Boolean,
    BooleanArray,
    Json,
}

impl ColumnType {
    /// Wire-format string for diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TextArray => "text_array",
            Self::Number => "number",
            Self::NumberArray => "number_array",
            Self::Boolean => "boolean",
            Self::BooleanArray => "boolean_array",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column definition within a table specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Stable local column identifier, unique within the table.
    pub id: String,
    /// Declared value type.
    pub data_type: ColumnType,
}

impl ColumnSpec {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            data_type,
        }
    }
}

/// One mirrored table: name plus ordered column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Logical table name, also the physical table name in storage.
    pub name: String,
    /// Declared columns in source order.
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a declared column by identifier.
    #[must_use]
    pub fn column(&self, id: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Whether `id` names a declared column.
    #[must_use]
    pub fn has_column(&self, id: &str) -> bool {
        self.column(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_serde_snake_case() {
        let json = serde_json::to_string(&ColumnType::TextArray).unwrap();
        assert_eq!(json, "\"text_array\"");
        let back: ColumnType = serde_json::from_str("\"number_array\"").unwrap();
        assert_eq!(back, ColumnType::NumberArray);
    }

    #[test]
    fn column_type_display_matches_as_str() {
        assert_eq!(ColumnType::Json.to_string(), "json");
        assert_eq!(ColumnType::Boolean.as_str(), "boolean");
    }

    #[test]
    fn table_spec_column_lookup() {
        let spec = TableSpec::new(
            "tasks",
            vec![
                ColumnSpec::new("title", ColumnType::Text),
                ColumnSpec::new("done", ColumnType::Boolean),
            ],
        );
        assert!(spec.has_column("title"));
        assert_eq!(spec.column("done").unwrap().data_type, ColumnType::Boolean);
        assert!(spec.column("missing").is_none());
    }

    #[test]
    fn table_spec_roundtrip() {
        let spec = TableSpec::new(
            "videos",
            vec![
                ColumnSpec::new("url", ColumnType::Text),
                ColumnSpec::new("tags", ColumnType::TextArray),
                ColumnSpec::new("stats", ColumnType::Json),
            ],
        );
        let json = serde_json::to_string(&spec).unwrap();
        let back: TableSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
