//! `DoAction` handlers: the router (C4), catalog discovery (C5), metadata
//! actions (C6), DDL handlers (C7), and transaction actions (part of C11).
//! See spec.md §4.2–§4.6, §4.9.

pub mod ddl;
pub mod discovery;
pub mod metadata;
pub mod router;

pub use router::{dispatch, ACTION_NAMES};

use crate::catalog::Catalog;
use crate::context::RequestContext;
use crate::transaction::TransactionManager;
use std::sync::Arc;

/// Everything a `DoAction` handler needs: the resolved catalog, the
/// enriched request context, and the transaction coordinator.
pub struct ActionContext {
    pub catalog: Arc<dyn Catalog>,
    pub request: RequestContext,
    pub transactions: Arc<TransactionManager>,
}
