//! Multi-catalog dispatcher (spec.md §4.8).

use crate::catalog::Catalog;
use crate::error::{AirportError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of catalogs keyed by name (empty string = default), guarded
/// by a read-write lock so lookups don't contend with registration
/// (spec.md §4.8, §5, §9 "Global state").
#[derive(Default)]
pub struct CatalogRegistry {
    catalogs: RwLock<HashMap<String, Arc<dyn Catalog>>>,
}

impl CatalogRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register (or replace) a catalog under `name`.
    pub async fn register(&self, name: impl Into<String>, catalog: Arc<dyn Catalog>) {
        let mut catalogs = self.catalogs.write().await;
        let _ = catalogs.insert(name.into(), catalog);
    }

    /// Remove a catalog. In-flight requests already hold their own
    /// `Arc<dyn Catalog>` clone and run to completion unaffected
    /// (spec.md §4.8).
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Catalog>> {
        let mut catalogs = self.catalogs.write().await;
        catalogs.remove(name)
    }

    /// Resolve a catalog by name, returning `CatalogNotFound` on miss
    /// (spec.md §4.8, §7 "Mismatched airport-catalog").
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Catalog>> {
        let catalogs = self.catalogs.read().await;
        catalogs
            .get(name)
            .cloned()
            .ok_or_else(|| AirportError::CatalogNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Schema;
    use async_trait::async_trait;

    struct EmptyCatalog;
    #[async_trait]
    impl Catalog for EmptyCatalog {
        async fn schemas(&self) -> Result<Vec<Arc<dyn Schema>>> {
            Ok(vec![])
        }
        async fn schema(&self, name: &str) -> Result<Arc<dyn Schema>> {
            Err(AirportError::SchemaNotFound(name.to_string()))
        }
    }

    #[tokio::test]
    async fn resolves_registered_catalog() {
        let registry = CatalogRegistry::new();
        registry.register("", Arc::new(EmptyCatalog)).await;
        assert!(registry.resolve("").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_catalog_is_not_found() {
        let registry = CatalogRegistry::new();
        let err = match registry.resolve("missing").await {
            Err(e) => e,
            Ok(_) => panic!("expected resolve to fail"),
        };
        assert!(matches!(err, AirportError::CatalogNotFound(_)));
    }

    #[tokio::test]
    async fn unregister_removes_and_returns_catalog() {
        let registry = CatalogRegistry::new();
        registry.register("a", Arc::new(EmptyCatalog)).await;
        assert!(registry.unregister("a").await.is_some());
        assert!(registry.resolve("a").await.is_err());
    }
}
