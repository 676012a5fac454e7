//! Action log persisted in the state store.

use scalegrid_core::{ActionLog, ActionRecord, BoxFuture, SourceError, SourceResult};
use scalegrid_state::StateStore;

/// Bounded action log over the store's `actions` table.
#[derive(Clone)]
pub struct StoreActionLog {
    store: StateStore,
    retention: usize,
}

impl StoreActionLog {
    /// Keep at most `retention` records (at least one).
    pub fn new(store: StateStore, retention: usize) -> Self {
        Self {
            store,
            retention: retention.max(1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

impl ActionLog for StoreActionLog {
    fn append(&self, record: ActionRecord) -> BoxFuture<'_, SourceResult<()>> {
        Box::pin(async move {
            self.store
                .append_action(&record, self.retention)
                .map_err(|e| SourceError::Unavailable(e.to_string()))
        })
    }
}
