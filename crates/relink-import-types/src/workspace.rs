//! Workspace-side records and the store the import pipeline writes through

use async_trait::async_trait;
use relink_core::UtcDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;

use crate::bundle::{BundleSource, DatasourceReference, DatasourceType};
use crate::error::ImportError;
use crate::ids::{ApplicationId, DatasourceId, DraftId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
}

/// Configured connection to an external system
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Datasource {
    pub id: DatasourceId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub datasource_type: DatasourceType,
    /// AES-GCM sealed credentials; never sent to clients
    #[serde(skip)]
    pub encrypted_credentials: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
}

impl Datasource {
    pub fn reference(&self) -> DatasourceReference {
        DatasourceReference::new(self.name.clone(), self.datasource_type)
    }
}

/// Datasource about to be persisted by a successful reconnection
#[derive(Debug, Clone)]
pub struct NewDatasource {
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub datasource_type: DatasourceType,
    pub encrypted_credentials: String,
}

#[derive(Debug, Clone)]
pub struct NewDraft {
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub source: BundleSource,
    pub references: Vec<DatasourceReference>,
}

/// Application created by an import, hidden from normal listing until finalized
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DraftApplication {
    pub id: DraftId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub source: BundleSource,
    pub references: Vec<DatasourceReference>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
}

/// Repository link of an application imported from Git
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GitLink {
    pub repository_url: String,
    /// Branch the application tracks
    pub branch: String,
    pub branches: Vec<String>,
}

impl GitLink {
    pub fn new(repository_url: impl Into<String>, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            repository_url: repository_url.into(),
            branches: vec![branch.clone()],
            branch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Application {
    pub id: ApplicationId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    /// Datasource name to the datasource actions run against; `None` when skipped
    #[schema(value_type = BTreeMap<String, Option<String>>)]
    pub datasource_bindings: BTreeMap<String, Option<DatasourceId>>,
    pub git: Option<GitLink>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Insert-if-absent lost against an existing datasource of the same name
    #[error("Datasource '{name}' already exists")]
    Conflict { name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { name } => ImportError::ConflictingDatasourceName(name),
            other => ImportError::Store(other.to_string()),
        }
    }
}

/// Workspace/application persistence used by the import pipeline.
///
/// Every method is expected to be atomic on its own.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn create_workspace(&self, name: &str) -> StoreResult<Workspace>;

    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> StoreResult<bool>;

    async fn create_draft_application(&self, draft: NewDraft) -> StoreResult<DraftApplication>;

    async fn list_datasources(&self, workspace_id: WorkspaceId) -> StoreResult<Vec<Datasource>>;

    /// Insert the datasource unless the name is already taken in the workspace
    async fn persist_datasource(&self, datasource: NewDatasource) -> StoreResult<Datasource>;

    /// Turn a draft into a visible application, all or nothing
    async fn materialize_application(
        &self,
        draft_id: DraftId,
        bindings: BTreeMap<String, Option<DatasourceId>>,
        git: Option<GitLink>,
    ) -> StoreResult<Application>;

    async fn discard_draft(&self, draft_id: DraftId) -> StoreResult<()>;

    /// Visible applications only; drafts are excluded
    async fn list_applications(&self, workspace_id: WorkspaceId) -> StoreResult<Vec<Application>>;
}
