//! Catalog interfaces (spec.md §3 "Catalog capabilities" .. "Table
//! function") and their capability probes (spec.md §9 "Polymorphism over
//! capabilities").
//!
//! Every base trait (`Catalog`, `Schema`, `Table`) exposes `as_*`
//! accessor methods returning `Option<&dyn ...>` for each optional
//! capability. The default implementation returns `None`; an entity opts
//! into a capability by overriding the accessor. Handlers probe the set
//! with these accessors and return `AirportError::Unimplemented` when the
//! probe comes back empty, per spec.md §7.

pub mod capability;
pub mod function;
pub mod table;

pub use capability::*;
pub use function::{InOutTableFunction, ScalarFunction, Signature, TableFunction};
pub use table::Table;

use crate::error::Result;
use crate::scan::ColumnStats;
use arrow_schema::DataType;
use async_trait::async_trait;
use std::sync::Arc;

/// Top-level container, routed to by the `airport-catalog` header
/// (spec.md §4.8, §4.10). Every catalog must expose `Schemas`/`Schema`;
/// everything else is an optional capability.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// List all schemas in this catalog.
    async fn schemas(&self) -> Result<Vec<Arc<dyn Schema>>>;

    /// Fetch a single schema by name.
    async fn schema(&self, name: &str) -> Result<Arc<dyn Schema>>;

    /// Optional: catalogs that can report their own name (empty = default).
    fn as_named(&self) -> Option<&dyn NamedCatalog> {
        None
    }

    /// Optional: catalogs supporting create/drop schema.
    fn as_dynamic(&self) -> Option<&dyn DynamicCatalog> {
        None
    }

    /// Optional: catalogs exposing a monotonic version counter.
    fn as_versioned(&self) -> Option<&dyn VersionedCatalog> {
        None
    }
}

/// A named schema containing tables and functions (spec.md §3 "Schema").
#[async_trait]
pub trait Schema: Send + Sync {
    fn name(&self) -> &str;
    fn comment(&self) -> Option<&str> {
        None
    }

    /// Whether the discovery payload should mark this schema as the
    /// catalog's default (spec.md §9 open question; resolved in
    /// DESIGN.md: explicit flag, defaulting to `false`).
    fn is_default(&self) -> bool {
        false
    }

    async fn tables(&self) -> Result<Vec<Arc<dyn Table>>>;
    async fn table_functions(&self) -> Result<Vec<Arc<dyn TableFunction>>>;
    async fn in_out_table_functions(&self) -> Result<Vec<Arc<dyn InOutTableFunction>>>;
    async fn scalar_functions(&self) -> Result<Vec<Arc<dyn ScalarFunction>>>;

    /// Optional: schemas supporting create/drop/rename table.
    fn as_dynamic(&self) -> Option<&dyn DynamicSchema> {
        None
    }
}

/// Column statistics accessor type used by `StatisticsTable`.
pub type StatsColumnType = DataType;

#[async_trait]
impl<T: Schema + ?Sized> SchemaExt for T {}

/// Convenience lookups layered on top of the base `Schema` trait.
#[async_trait]
pub trait SchemaExt: Schema {
    async fn find_table(&self, name: &str) -> Result<Arc<dyn Table>> {
        self.tables()
            .await?
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| crate::error::AirportError::TableNotFound {
                schema: self.name().to_string(),
                table: name.to_string(),
            })
    }

    async fn find_table_function(&self, name: &str) -> Result<Arc<dyn TableFunction>> {
        self.table_functions()
            .await?
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| crate::error::AirportError::TableFunctionNotFound {
                schema: self.name().to_string(),
                name: name.to_string(),
            })
    }

    async fn find_in_out_table_function(&self, name: &str) -> Result<Arc<dyn InOutTableFunction>> {
        self.in_out_table_functions()
            .await?
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| crate::error::AirportError::TableFunctionNotFound {
                schema: self.name().to_string(),
                name: name.to_string(),
            })
    }

    async fn find_scalar_function(&self, name: &str) -> Result<Arc<dyn ScalarFunction>> {
        self.scalar_functions()
            .await?
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| crate::error::AirportError::ScalarFunctionNotFound {
                schema: self.name().to_string(),
                name: name.to_string(),
            })
    }
}

/// Statistics for a single column (`StatisticsTable` capability).
#[async_trait]
pub trait StatisticsTable: Send + Sync {
    async fn column_statistics(&self, column: &str, data_type: &StatsColumnType) -> Result<ColumnStats>;
}
