//! Reconnection records and the per-import state machine

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::bundle::{DatasourceReference, DatasourceType};
use crate::error::{ImportError, Result};
use crate::ids::{ApplicationId, DatasourceId};

/// Lifecycle of an import.
///
/// `Uploaded → Parsed → Resolving → Finalized | Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    Uploaded,
    Parsed,
    Resolving,
    Finalized,
    Aborted,
}

impl ImportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportState::Uploaded => "uploaded",
            ImportState::Parsed => "parsed",
            ImportState::Resolving => "resolving",
            ImportState::Finalized => "finalized",
            ImportState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Finalized | ImportState::Aborted)
    }

    pub fn can_transition_to(&self, next: ImportState) -> bool {
        matches!(
            (self, next),
            (ImportState::Uploaded, ImportState::Parsed)
                | (ImportState::Parsed, ImportState::Resolving)
                | (ImportState::Resolving, ImportState::Finalized)
                | (ImportState::Resolving, ImportState::Aborted)
        )
    }

    /// Move to `next`, or report the move as not allowed for `action`
    pub fn advance(&mut self, next: ImportState, action: &str) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(ImportError::invalid_state(*self, action));
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectionStatus {
    Pending,
    Testing,
    Resolved,
    Failed,
    /// Explicitly left unconnected by the caller
    Skipped,
}

impl ReconnectionStatus {
    /// Statuses the finalizer accepts
    pub fn is_settled(&self) -> bool {
        matches!(self, ReconnectionStatus::Resolved | ReconnectionStatus::Skipped)
    }
}

impl std::fmt::Display for ReconnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReconnectionStatus::Pending => "pending",
            ReconnectionStatus::Testing => "testing",
            ReconnectionStatus::Resolved => "resolved",
            ReconnectionStatus::Failed => "failed",
            ReconnectionStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// One per datasource reference with no live counterpart in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PendingReconnection {
    pub datasource_name: String,
    pub datasource_type: DatasourceType,
    pub status: ReconnectionStatus,
    /// Number of connectivity probes run for this record
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set once the record is resolved
    pub datasource_id: Option<DatasourceId>,
}

impl PendingReconnection {
    pub fn new(reference: &DatasourceReference) -> Self {
        Self {
            datasource_name: reference.name.clone(),
            datasource_type: reference.datasource_type,
            status: ReconnectionStatus::Pending,
            attempts: 0,
            last_error: None,
            datasource_id: None,
        }
    }

    /// Enter `Testing`. Allowed from every status except `Testing` and `Resolved`.
    pub fn begin_test(&mut self) -> Result<()> {
        match self.status {
            ReconnectionStatus::Pending
            | ReconnectionStatus::Failed
            | ReconnectionStatus::Skipped => {
                self.status = ReconnectionStatus::Testing;
                self.attempts += 1;
                Ok(())
            }
            ReconnectionStatus::Testing | ReconnectionStatus::Resolved => Err(
                ImportError::Internal(format!(
                    "datasource '{}' cannot start a test while {}",
                    self.datasource_name, self.status
                )),
            ),
        }
    }

    pub fn mark_resolved(&mut self, datasource_id: DatasourceId) {
        self.status = ReconnectionStatus::Resolved;
        self.datasource_id = Some(datasource_id);
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = ReconnectionStatus::Failed;
        self.last_error = Some(reason.into());
    }

    /// Skip the record. Resolved or in-flight records cannot be skipped.
    pub fn mark_skipped(&mut self) -> Result<()> {
        match self.status {
            ReconnectionStatus::Pending
            | ReconnectionStatus::Failed
            | ReconnectionStatus::Skipped => {
                self.status = ReconnectionStatus::Skipped;
                Ok(())
            }
            other => Err(ImportError::Internal(format!(
                "datasource '{}' cannot be skipped while {}",
                self.datasource_name, other
            ))),
        }
    }
}

/// Terminal record produced once by the finalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportResult {
    pub success: bool,
    pub application_id: Option<ApplicationId>,
    /// Datasources left unconnected (skipped)
    pub unresolved_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PendingReconnection {
        PendingReconnection::new(&DatasourceReference::new(
            "TEDPostgres",
            DatasourceType::Postgres,
        ))
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut state = ImportState::Uploaded;

        state.advance(ImportState::Parsed, "parse").unwrap();
        state.advance(ImportState::Resolving, "resolve").unwrap();
        state.advance(ImportState::Finalized, "finalize").unwrap();

        assert!(state.is_terminal());
    }

    #[test]
    fn test_aborted_only_reachable_from_resolving() {
        assert!(!ImportState::Parsed.can_transition_to(ImportState::Aborted));
        assert!(ImportState::Resolving.can_transition_to(ImportState::Aborted));
        assert!(!ImportState::Finalized.can_transition_to(ImportState::Aborted));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut state = ImportState::Finalized;

        let result = state.advance(ImportState::Resolving, "reconnect");

        assert!(matches!(result, Err(ImportError::InvalidState { .. })));
        assert_eq!(state, ImportState::Finalized);
    }

    #[test]
    fn test_failed_record_can_be_retested() {
        let mut record = record();
        record.begin_test().unwrap();
        record.mark_failed("password authentication failed");

        record.begin_test().unwrap();

        assert_eq!(record.status, ReconnectionStatus::Testing);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_resolved_record_cannot_be_retested_or_skipped() {
        let mut record = record();
        record.begin_test().unwrap();
        record.mark_resolved(DatasourceId::new());

        assert!(record.begin_test().is_err());
        assert!(record.mark_skipped().is_err());
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_only_resolved_and_skipped_are_settled() {
        assert!(ReconnectionStatus::Resolved.is_settled());
        assert!(ReconnectionStatus::Skipped.is_settled());
        assert!(!ReconnectionStatus::Pending.is_settled());
        assert!(!ReconnectionStatus::Testing.is_settled());
        assert!(!ReconnectionStatus::Failed.is_settled());
    }
}
