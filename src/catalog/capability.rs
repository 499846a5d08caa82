//! Optional catalog/schema/table capabilities (spec.md §3 tables).

use crate::error::Result;
use crate::scan::{BatchStream, DmlOptions, DmlResult};
use arrow_schema::{DataType, SchemaRef};
use async_trait::async_trait;
use std::sync::Arc;

/// Catalogs that can report their own name; empty string denotes the
/// default catalog (spec.md §3).
pub trait NamedCatalog: Send + Sync {
    fn catalog_name(&self) -> &str;
}

/// Catalogs supporting create/drop schema (spec.md §3).
#[async_trait]
pub trait DynamicCatalog: Send + Sync {
    async fn create_schema(&self, name: &str, comment: Option<&str>) -> Result<()>;
    async fn drop_schema(&self, name: &str, cascade: bool) -> Result<()>;
}

/// Version info returned by `catalog_version` (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogVersion {
    pub version: u64,
    pub is_fixed: bool,
}

/// Catalogs exposing a monotonic version counter (spec.md §3).
#[async_trait]
pub trait VersionedCatalog: Send + Sync {
    async fn catalog_version(&self) -> Result<CatalogVersion>;
}

/// Schemas supporting create/drop/rename table (spec.md §3).
#[async_trait]
pub trait DynamicSchema: Send + Sync {
    async fn create_table(&self, name: &str, schema: SchemaRef, comment: Option<&str>) -> Result<Arc<dyn super::Table>>;
    async fn drop_table(&self, name: &str) -> Result<()>;
    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<()>;
}

/// A request for the effective schema of a table at a given time point /
/// projection (spec.md §3 "DynamicSchemaTable").
#[derive(Debug, Clone, Default)]
pub struct SchemaRequest {
    pub time_point: Option<crate::codec::ticket::TimePoint>,
    pub columns: Option<Vec<String>>,
}

/// Tables whose schema varies with time/projection (spec.md §3).
#[async_trait]
pub trait DynamicSchemaTable: Send + Sync {
    async fn schema_for_request(&self, request: &SchemaRequest) -> Result<SchemaRef>;
}

/// Tables accepting `INSERT` (spec.md §3, §4.7).
#[async_trait]
pub trait InsertableTable: Send + Sync {
    async fn insert(&self, reader: BatchStream, opts: DmlOptions) -> Result<DmlResult>;
}

/// Tables accepting `UPDATE` keyed by rowid (spec.md §3, §4.7).
#[async_trait]
pub trait UpdatableTable: Send + Sync {
    async fn update(&self, row_ids: Vec<i64>, reader: BatchStream, opts: DmlOptions) -> Result<DmlResult>;
}

/// Tables accepting `DELETE` keyed by rowid (spec.md §3, §4.7).
#[async_trait]
pub trait DeletableTable: Send + Sync {
    async fn delete(&self, row_ids: Vec<i64>, opts: DmlOptions) -> Result<DmlResult>;
}

/// Schema/column mutation capability (spec.md §3 "DynamicTable").
#[async_trait]
pub trait DynamicTable: Send + Sync {
    async fn add_column(&self, name: &str, data_type: &DataType, nullable: bool) -> Result<()>;
    async fn remove_column(&self, name: &str, if_exists: bool) -> Result<()>;
    async fn rename_column(&self, old_name: &str, new_name: &str) -> Result<()>;
    async fn change_column_type(&self, name: &str, data_type: &DataType) -> Result<()>;
    async fn set_not_null(&self, name: &str) -> Result<()>;
    async fn drop_not_null(&self, name: &str) -> Result<()>;
    async fn set_default(&self, name: &str, default_expr: &str) -> Result<()>;
    async fn add_field(&self, column: &str, field_path: &[String], data_type: &DataType) -> Result<()>;
    async fn rename_field(&self, column: &str, field_path: &[String], new_name: &str) -> Result<()>;
}
