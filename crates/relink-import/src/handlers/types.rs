//! Request and response types for import handlers

use relink_core::UtcDateTime;
use relink_import_types::{
    BundleSource, DraftId, ImportResult, ImportState, PendingReconnection, ValidationReport,
    WorkspaceId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::services::{ImportOrchestrator, ImportSession};

/// Application state for handlers
pub struct AppState {
    pub import_orchestrator: Arc<ImportOrchestrator>,
}

/// Request to create a workspace
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

/// Repository a bundle was pulled from
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GitSourceRequest {
    pub repository_url: String,
    /// Branch to track; the configured default branch when omitted
    pub branch: Option<String>,
}

/// Request to start an import
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StartImportRequest {
    /// Exported application bundle, as produced by the export feature
    #[schema(value_type = Object)]
    pub bundle: serde_json::Value,
    /// Set when the bundle comes from a Git repository
    pub git: Option<GitSourceRequest>,
}

impl StartImportRequest {
    pub fn source(&self) -> BundleSource {
        match &self.git {
            Some(git) => BundleSource::Git {
                repository_url: git.repository_url.clone(),
                branch: git.branch.clone(),
            },
            None => BundleSource::Json,
        }
    }
}

/// Snapshot of an import
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportStatus {
    pub draft_id: DraftId,
    pub workspace_id: WorkspaceId,
    pub application_name: String,
    pub state: ImportState,
    pub source: BundleSource,
    /// Datasources that need credentials, in bundle order
    pub reconnections: Vec<PendingReconnection>,
    /// Referenced datasources that already existed in the workspace
    pub existing_datasources: Vec<String>,
    /// Pre-flight validation of the bundle
    pub validation: ValidationReport,
    pub warnings: Vec<String>,
    /// Set once the import is finalized
    pub result: Option<ImportResult>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: UtcDateTime,
}

impl ImportStatus {
    pub fn from_session(session: &ImportSession) -> Self {
        Self {
            draft_id: session.draft_id,
            workspace_id: session.workspace_id,
            application_name: session.application_name.clone(),
            state: session.state(),
            source: session.source.clone(),
            reconnections: session.records(),
            existing_datasources: session.bound.keys().cloned().collect(),
            validation: session.validation.clone(),
            warnings: session.validation.warnings(),
            result: session.result(),
            created_at: session.created_at,
            updated_at: session.updated_at(),
        }
    }
}
