//! Import orchestration services

mod finalizer;
mod importer;
mod locks;
mod orchestrator;
mod resolver;
mod session;
mod store;
mod validator;

pub use finalizer::ImportFinalizer;
pub use importer::{BundleImporter, ParsedImport};
pub use locks::DatasourceLocks;
pub use orchestrator::{CommandOutcome, ImportCommand, ImportEvent, ImportOrchestrator};
pub use resolver::{resolve_bindings, resolve_dependencies};
pub use session::{ImportSession, ReconnectionSlot};
pub use store::InMemoryWorkspaceStore;
pub use validator::ReconnectionValidator;

use axum::http::StatusCode;
use relink_core::problemdetails::{self, Problem};
use relink_import_types::ImportError;
use thiserror::Error;

/// Import service errors
#[derive(Error, Debug)]
pub enum ImportServiceError {
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Request body or parameters could not be used
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for import services
pub type ImportServiceResult<T> = Result<T, ImportServiceError>;

impl From<ImportServiceError> for Problem {
    fn from(error: ImportServiceError) -> Self {
        match error {
            ImportServiceError::Import(e) => import_problem(e),
            ImportServiceError::Validation(msg) => problemdetails::new(StatusCode::BAD_REQUEST)
                .with_title("Validation Error")
                .with_detail(msg),
            ImportServiceError::Internal(msg) => {
                problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_title("Internal Server Error")
                    .with_detail(msg)
            }
        }
    }
}

fn import_problem(error: ImportError) -> Problem {
    let detail = error.to_string();
    match error {
        ImportError::MalformedBundle(_) => problemdetails::new(StatusCode::BAD_REQUEST)
            .with_title("Malformed Bundle")
            .with_detail(detail),
        ImportError::ValidationFailed(_) => problemdetails::new(StatusCode::BAD_REQUEST)
            .with_title("Bundle Validation Failed")
            .with_detail(detail),
        ImportError::WorkspaceNotFound(id) => problemdetails::new(StatusCode::NOT_FOUND)
            .with_title("Workspace Not Found")
            .with_detail(detail)
            .with_value("workspace_id", id.to_string()),
        ImportError::SessionNotFound(id) => problemdetails::new(StatusCode::NOT_FOUND)
            .with_title("Import Not Found")
            .with_detail(detail)
            .with_value("draft_id", id.to_string()),
        ImportError::UnknownDatasource(name) => problemdetails::new(StatusCode::NOT_FOUND)
            .with_title("Unknown Datasource")
            .with_detail(detail)
            .with_value("datasource_name", name),
        ImportError::Validation(e) => problemdetails::new(StatusCode::UNPROCESSABLE_ENTITY)
            .with_title("Datasource Validation Failed")
            .with_detail(detail)
            .with_value("datasource_name", e.datasource_name.clone())
            .with_value(
                "reason",
                serde_json::to_value(&e.reason).unwrap_or_default(),
            ),
        ImportError::UnresolvedDependencies { pending } => {
            problemdetails::new(StatusCode::CONFLICT)
                .with_title("Unresolved Dependencies")
                .with_detail(detail)
                .with_value("pending", pending)
        }
        ImportError::ConflictingDatasourceName(name) => problemdetails::new(StatusCode::CONFLICT)
            .with_title("Datasource Name Conflict")
            .with_detail(detail)
            .with_value("datasource_name", name),
        ImportError::InvalidState { state, .. } => problemdetails::new(StatusCode::CONFLICT)
            .with_title("Invalid Import State")
            .with_detail(detail)
            .with_value("state", state.as_str()),
        ImportError::ImportInProgress(id) => problemdetails::new(StatusCode::CONFLICT)
            .with_title("Import In Progress")
            .with_detail(detail)
            .with_value("draft_id", id.to_string()),
        ImportError::Store(_) | ImportError::Encryption(_) | ImportError::Internal(_) => {
            problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Internal Server Error")
                .with_detail(detail)
        }
    }
}
