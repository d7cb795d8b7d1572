//! Per-import session state
//!
//! A session owns one [`ReconnectionSlot`] per pending datasource plus a phase
//! gate. Reconnect and skip hold the gate for reading; finalize and cancel take
//! it for writing, which waits out every in-flight reconnection.

use chrono::Utc;
use relink_core::UtcDateTime;
use relink_import_types::{
    BundleSource, Datasource, DatasourceId, DatasourceReference, DraftId, ImportError,
    ImportResult, ImportState, PendingReconnection, ReconnectionStatus, Result, ValidationReport,
    WorkspaceId,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct SlotState {
    record: PendingReconnection,
    datasource: Option<Datasource>,
}

/// One pending datasource of an import.
///
/// `gate` serializes reconnect/skip calls on the record. The snapshot sits
/// behind a plain mutex so status reads never wait for a probe.
pub struct ReconnectionSlot {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<SlotState>,
}

impl ReconnectionSlot {
    pub fn new(record: PendingReconnection) -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(SlotState {
                record,
                datasource: None,
            }),
        }
    }

    pub(crate) async fn enter(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub fn snapshot(&self) -> PendingReconnection {
        lock(&self.state).record.clone()
    }

    pub fn reference(&self) -> DatasourceReference {
        let state = lock(&self.state);
        DatasourceReference::new(
            state.record.datasource_name.clone(),
            state.record.datasource_type,
        )
    }

    pub fn status(&self) -> ReconnectionStatus {
        lock(&self.state).record.status
    }

    /// Datasource persisted for this record, once resolved
    pub fn datasource(&self) -> Option<Datasource> {
        lock(&self.state).datasource.clone()
    }

    pub(crate) fn begin_test(&self) -> Result<()> {
        lock(&self.state).record.begin_test()
    }

    pub(crate) fn mark_resolved(&self, datasource: Datasource) {
        let mut state = lock(&self.state);
        state.record.mark_resolved(datasource.id);
        state.datasource = Some(datasource);
    }

    pub(crate) fn mark_failed(&self, reason: impl Into<String>) {
        lock(&self.state).record.mark_failed(reason);
    }

    /// Fail a record still in `Testing`, e.g. after the probing task was dropped
    pub(crate) fn abandon_test(&self) {
        let mut state = lock(&self.state);
        if state.record.status == ReconnectionStatus::Testing {
            state.record.mark_failed("connection test was interrupted");
        }
    }

    pub(crate) fn mark_skipped(&self) -> Result<PendingReconnection> {
        let mut state = lock(&self.state);
        if state.record.status == ReconnectionStatus::Resolved {
            return Err(ImportError::invalid_state(
                ImportState::Resolving,
                format!("skip resolved datasource '{}'", state.record.datasource_name),
            ));
        }
        state.record.mark_skipped()?;
        Ok(state.record.clone())
    }
}

/// Everything the orchestrator tracks for one import
pub struct ImportSession {
    pub draft_id: DraftId,
    pub user_id: String,
    pub workspace_id: WorkspaceId,
    pub application_name: String,
    pub source: BundleSource,
    pub validation: ValidationReport,
    /// References that matched live datasources at import time
    pub bound: BTreeMap<String, DatasourceId>,
    pub slots: Vec<ReconnectionSlot>,
    pub created_at: UtcDateTime,
    phase: RwLock<()>,
    state: Mutex<ImportState>,
    result: Mutex<Option<ImportResult>>,
    updated_at: Mutex<UtcDateTime>,
}

impl ImportSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        draft_id: DraftId,
        user_id: impl Into<String>,
        workspace_id: WorkspaceId,
        application_name: impl Into<String>,
        source: BundleSource,
        validation: ValidationReport,
        bound: BTreeMap<String, DatasourceId>,
        pending: Vec<PendingReconnection>,
        state: ImportState,
    ) -> Self {
        let now = Utc::now();
        Self {
            draft_id,
            user_id: user_id.into(),
            workspace_id,
            application_name: application_name.into(),
            source,
            validation,
            bound,
            slots: pending.into_iter().map(ReconnectionSlot::new).collect(),
            created_at: now,
            phase: RwLock::new(()),
            state: Mutex::new(state),
            result: Mutex::new(None),
            updated_at: Mutex::new(now),
        }
    }

    pub fn state(&self) -> ImportState {
        *lock(&self.state)
    }

    pub fn result(&self) -> Option<ImportResult> {
        lock(&self.result).clone()
    }

    pub fn updated_at(&self) -> UtcDateTime {
        *lock(&self.updated_at)
    }

    pub fn records(&self) -> Vec<PendingReconnection> {
        self.slots.iter().map(ReconnectionSlot::snapshot).collect()
    }

    pub fn slot(&self, datasource_name: &str) -> Result<&ReconnectionSlot> {
        let name = datasource_name.trim();
        self.slots
            .iter()
            .find(|s| s.snapshot().datasource_name == name)
            .ok_or_else(|| ImportError::UnknownDatasource(name.to_string()))
    }

    /// Names of records that would block finalize
    pub fn unsettled(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| !r.status.is_settled())
            .map(|r| r.datasource_name)
            .collect()
    }

    pub(crate) async fn enter_phase(&self) -> RwLockReadGuard<'_, ()> {
        self.phase.read().await
    }

    pub(crate) async fn barrier(&self) -> RwLockWriteGuard<'_, ()> {
        self.phase.write().await
    }

    /// Reject `action` unless the import is still resolving
    pub fn ensure_resolving(&self, action: &str) -> Result<()> {
        let state = self.state();
        if state != ImportState::Resolving {
            return Err(ImportError::invalid_state(state, action));
        }
        Ok(())
    }

    pub fn advance(&self, next: ImportState, action: &str) -> Result<()> {
        lock(&self.state).advance(next, action)?;
        self.touch();
        Ok(())
    }

    pub(crate) fn set_result(&self, result: ImportResult) {
        *lock(&self.result) = Some(result);
    }

    pub fn touch(&self) {
        *lock(&self.updated_at) = Utc::now();
    }
}
