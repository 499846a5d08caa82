//! The `Table` trait (spec.md §3 "Table").

use super::capability::{
    DeletableTable, DynamicSchemaTable, DynamicTable, InsertableTable, UpdatableTable,
};
use super::StatisticsTable;
use crate::error::Result;
use crate::scan::{BatchStream, ScanOptions};
use arrow_schema::SchemaRef;
use async_trait::async_trait;

/// Field metadata key identifying a pseudo-column such as `rowid`
/// (spec.md §3 "Table"). Implementations may also name the column
/// literally `rowid`; callers check both.
pub const IS_ROWID_METADATA_KEY: &str = "is_rowid";

/// Schema metadata key marking a table as statistics-capable in the
/// discovery payload (spec.md §4.3).
pub const CAN_PRODUCE_STATISTICS_KEY: &str = "can_produce_statistics";

/// A scannable, optionally mutable table (spec.md §3 "Table").
#[async_trait]
pub trait Table: Send + Sync {
    fn name(&self) -> &str;
    fn comment(&self) -> Option<&str> {
        None
    }

    /// The table's Arrow schema. `projection` is a hint; when `None` the
    /// full schema is always returned (spec.md §3).
    fn arrow_schema(&self, projection: Option<&[String]>) -> SchemaRef;

    /// Produce a lazy, restartable-per-call sequence of record batches.
    async fn scan(&self, options: ScanOptions) -> Result<BatchStream>;

    fn as_dynamic_schema(&self) -> Option<&dyn DynamicSchemaTable> {
        None
    }
    fn as_insertable(&self) -> Option<&dyn InsertableTable> {
        None
    }
    fn as_updatable(&self) -> Option<&dyn UpdatableTable> {
        None
    }
    fn as_deletable(&self) -> Option<&dyn DeletableTable> {
        None
    }
    fn as_dynamic(&self) -> Option<&dyn DynamicTable> {
        None
    }
    fn as_statistics(&self) -> Option<&dyn StatisticsTable> {
        None
    }
}

/// Whether a field is a rowid-style pseudo-column, by name or metadata
/// tag (spec.md §3, §4.7 "Update").
pub fn field_is_rowid(field: &arrow_schema::Field) -> bool {
    field.name() == "rowid"
        || field
            .metadata()
            .get(IS_ROWID_METADATA_KEY)
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// The table's data columns: every field excluding rowid-style
/// pseudo-columns (spec.md §3 "DMLOptions", §4.7 "Insert"/"Update").
pub fn data_columns(schema: &arrow_schema::Schema) -> Vec<String> {
    schema
        .fields()
        .iter()
        .filter(|f| !field_is_rowid(f))
        .map(|f| f.name().clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field, Schema};
    use std::collections::HashMap;

    #[test]
    fn detects_rowid_by_name() {
        let f = Field::new("rowid", DataType::Int64, false);
        assert!(field_is_rowid(&f));
    }

    #[test]
    fn detects_rowid_by_metadata() {
        let mut meta = HashMap::new();
        meta.insert(IS_ROWID_METADATA_KEY.to_string(), "1".to_string());
        let f = Field::new("__id", DataType::Int64, false).with_metadata(meta);
        assert!(field_is_rowid(&f));
    }

    #[test]
    fn data_columns_excludes_rowid() {
        let schema = Schema::new(vec![
            Field::new("rowid", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]);
        assert_eq!(data_columns(&schema), vec!["name".to_string()]);
    }
}
