//! Error types for the import system

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::bundle::DatasourceType;
use crate::ids::{DraftId, WorkspaceId};
use crate::reconnection::ImportState;

/// Result type for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Why a reconnection attempt was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ValidationFailureReason {
    /// The external system refused or could not be reached
    ProbeFailed(String),
    /// The probe did not answer within the configured timeout
    Timeout,
    /// Credentials were for a different kind of datasource
    CredentialTypeMismatch {
        expected: DatasourceType,
        actual: DatasourceType,
    },
    /// Credentials failed structural checks before probing
    InvalidCredentials(String),
    /// No probe is registered for this datasource type
    UnsupportedType(DatasourceType),
}

impl std::fmt::Display for ValidationFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailureReason::ProbeFailed(msg) => write!(f, "connection test failed: {}", msg),
            ValidationFailureReason::Timeout => write!(f, "connection test timed out"),
            ValidationFailureReason::CredentialTypeMismatch { expected, actual } => write!(
                f,
                "expected {} credentials but received {}",
                expected, actual
            ),
            ValidationFailureReason::InvalidCredentials(msg) => {
                write!(f, "invalid credentials: {}", msg)
            }
            ValidationFailureReason::UnsupportedType(t) => {
                write!(f, "no connectivity probe available for {}", t)
            }
        }
    }
}

/// Per-datasource, user-correctable failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, ToSchema)]
#[error("Datasource '{datasource_name}': {reason}")]
pub struct ValidationError {
    pub datasource_name: String,
    pub reason: ValidationFailureReason,
}

impl ValidationError {
    pub fn new(datasource_name: impl Into<String>, reason: ValidationFailureReason) -> Self {
        Self {
            datasource_name: datasource_name.into(),
            reason,
        }
    }
}

/// Errors that can occur during import operations
#[derive(Error, Debug)]
pub enum ImportError {
    /// Payload could not be parsed as a bundle
    #[error("Malformed bundle: {0}")]
    MalformedBundle(String),

    /// Destination workspace does not exist
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),

    /// Bundle failed pre-flight validation
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A reconnection attempt was rejected; retry with corrected credentials
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Finalize was called while records were still open
    #[error("Unresolved dependencies: {}", pending.join(", "))]
    UnresolvedDependencies { pending: Vec<String> },

    /// Another import persisted a datasource with this name first
    #[error("Datasource name already in use in workspace: {0}")]
    ConflictingDatasourceName(String),

    /// The import does not reference a datasource with this name
    #[error("Unknown datasource: {0}")]
    UnknownDatasource(String),

    #[error("Import session not found: {0}")]
    SessionNotFound(DraftId),

    /// Command is not allowed in the import's current state
    #[error("Cannot {action} while import is {state}")]
    InvalidState { state: ImportState, action: String },

    /// The caller already has an import in progress
    #[error("Import already in progress: {0}")]
    ImportInProgress(DraftId),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    pub fn invalid_state(state: ImportState, action: impl Into<String>) -> Self {
        ImportError::InvalidState {
            state,
            action: action.into(),
        }
    }

    /// Whether the caller can fix this by retrying the same step
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ImportError::Validation(_) | ImportError::UnresolvedDependencies { .. }
        )
    }
}

impl From<relink_core::CipherError> for ImportError {
    fn from(err: relink_core::CipherError) -> Self {
        ImportError::Encryption(err.to_string())
    }
}
