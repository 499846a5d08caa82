//! Transaction coordinator (spec.md §4.9, §3 "Transaction state").

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle state of a single transaction (spec.md §3, §9 open question:
/// closed enum of four string values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    Unknown,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled_back",
            TransactionState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
struct TransactionEntry {
    state: TransactionState,
    catalog_name: Option<String>,
}

/// Process-wide map of transaction id -> state, guarded by a single
/// mutex (spec.md §4.9, §9 "Global state").
#[derive(Default)]
pub struct TransactionManager {
    entries: Mutex<HashMap<String, TransactionEntry>>,
}

impl TransactionManager {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `create_transaction`: allocate a new id and mark it active.
    pub async fn create_transaction(&self, catalog_name: Option<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut entries = self.entries.lock().await;
        let _ = entries.insert(
            id.clone(),
            TransactionEntry {
                state: TransactionState::Active,
                catalog_name,
            },
        );
        id
    }

    /// `get_transaction_status`: `(status, exists)`.
    pub async fn status(&self, id: &str) -> (TransactionState, bool) {
        let entries = self.entries.lock().await;
        match entries.get(id) {
            Some(entry) => (entry.state, true),
            None => (TransactionState::Unknown, false),
        }
    }

    /// Mark a transaction committed and remove it (terminal transition).
    pub async fn commit(&self, id: &str) {
        let mut entries = self.entries.lock().await;
        let _ = entries.remove(id);
        tracing::debug!(transaction_id = id, "transaction committed");
    }

    /// Mark a transaction rolled back and remove it (terminal
    /// transition). Failures calling this are logged by the caller, not
    /// surfaced to the client (spec.md §4.9, §7).
    pub async fn rollback(&self, id: &str) {
        let mut entries = self.entries.lock().await;
        let _ = entries.remove(id);
        tracing::debug!(transaction_id = id, "transaction rolled back");
    }

    /// Run `op` inside a transaction bound to `transaction_id`, if any:
    /// commit on success, roll back on failure (spec.md §4.9, §4.7
    /// "All DML operations are wrapped in `withTransaction`").
    pub async fn with_transaction<T, E, F, Fut>(
        self: &Arc<Self>,
        transaction_id: Option<&str>,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let Some(id) = transaction_id else {
            return op().await;
        };
        match op().await {
            Ok(value) => {
                self.commit(id).await;
                Ok(value)
            }
            Err(err) => {
                self.rollback(id).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_transaction_reports_unknown_and_absent() {
        let mgr = TransactionManager::new();
        let (state, exists) = mgr.status("nonexistent").await;
        assert_eq!(state, TransactionState::Unknown);
        assert!(!exists);
    }

    #[tokio::test]
    async fn created_transaction_is_active_then_removed_on_commit() {
        let mgr = TransactionManager::new();
        let id = mgr.create_transaction(None).await;
        let (state, exists) = mgr.status(&id).await;
        assert_eq!(state, TransactionState::Active);
        assert!(exists);

        mgr.commit(&id).await;
        let (_, exists) = mgr.status(&id).await;
        assert!(!exists);
    }

    #[tokio::test]
    async fn with_transaction_commits_on_success_and_rolls_back_on_error() {
        let mgr = TransactionManager::new();

        let id_ok = mgr.create_transaction(None).await;
        let res: Result<(), &str> = mgr.with_transaction(Some(&id_ok), || async { Ok(()) }).await;
        assert!(res.is_ok());
        assert!(!mgr.status(&id_ok).await.1);

        let id_err = mgr.create_transaction(None).await;
        let res: Result<(), &str> = mgr
            .with_transaction(Some(&id_err), || async { Err("boom") })
            .await;
        assert!(res.is_err());
        assert!(!mgr.status(&id_err).await.1);
    }

    #[tokio::test]
    async fn with_transaction_runs_directly_without_id() {
        let mgr = TransactionManager::new();
        let res: Result<i32, &str> = mgr.with_transaction(None, || async { Ok(42) }).await;
        assert_eq!(res.unwrap(), 42);
    }
}
