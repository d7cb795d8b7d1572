use relink_import_types::WorkspaceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type NameLock = Arc<tokio::sync::Mutex<()>>;

/// Async locks keyed by datasource name within a workspace.
///
/// Persisting a datasource holds the lock for its `(workspace, name)` so two
/// imports racing on the same name serialize. Idle entries are dropped on the
/// next acquire.
#[derive(Default)]
pub struct DatasourceLocks {
    locks: Mutex<HashMap<(WorkspaceId, String), NameLock>>,
}

impl DatasourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, workspace_id: WorkspaceId, name: &str) -> NameLock {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry((workspace_id, name.to_string()))
            .or_default()
            .clone()
    }
}
