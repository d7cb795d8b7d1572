//! In-memory workspace store
//!
//! All state sits behind one `RwLock`, so every trait method is atomic on its
//! own and `materialize_application` never leaves a half-written application.

use async_trait::async_trait;
use chrono::Utc;
use relink_import_types::{
    Application, ApplicationId, Datasource, DatasourceId, DraftApplication, DraftId, GitLink,
    NewDatasource, NewDraft, StoreError, StoreResult, Workspace, WorkspaceId, WorkspaceStore,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct StoreState {
    workspaces: HashMap<WorkspaceId, Workspace>,
    datasources: HashMap<WorkspaceId, Vec<Datasource>>,
    drafts: HashMap<DraftId, DraftApplication>,
    applications: HashMap<WorkspaceId, Vec<Application>>,
}

#[derive(Default)]
pub struct InMemoryWorkspaceStore {
    state: RwLock<StoreState>,
}

impl InMemoryWorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draft lookup, used by tests to check drafts stay hidden
    pub async fn draft(&self, draft_id: DraftId) -> Option<DraftApplication> {
        self.state.read().await.drafts.get(&draft_id).cloned()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn create_workspace(&self, name: &str) -> StoreResult<Workspace> {
        let workspace = Workspace {
            id: WorkspaceId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        let mut state = self.state.write().await;
        state.workspaces.insert(workspace.id, workspace.clone());
        debug!("Created workspace {} ({})", workspace.name, workspace.id);
        Ok(workspace)
    }

    async fn workspace_exists(&self, workspace_id: WorkspaceId) -> StoreResult<bool> {
        Ok(self.state.read().await.workspaces.contains_key(&workspace_id))
    }

    async fn create_draft_application(&self, draft: NewDraft) -> StoreResult<DraftApplication> {
        let mut state = self.state.write().await;
        if !state.workspaces.contains_key(&draft.workspace_id) {
            return Err(StoreError::NotFound(format!(
                "workspace {}",
                draft.workspace_id
            )));
        }

        let draft = DraftApplication {
            id: DraftId::new(),
            workspace_id: draft.workspace_id,
            name: draft.name,
            source: draft.source,
            references: draft.references,
            created_at: Utc::now(),
        };
        state.drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn list_datasources(&self, workspace_id: WorkspaceId) -> StoreResult<Vec<Datasource>> {
        let state = self.state.read().await;
        Ok(state
            .datasources
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn persist_datasource(&self, datasource: NewDatasource) -> StoreResult<Datasource> {
        let mut state = self.state.write().await;
        if !state.workspaces.contains_key(&datasource.workspace_id) {
            return Err(StoreError::NotFound(format!(
                "workspace {}",
                datasource.workspace_id
            )));
        }

        let existing = state.datasources.entry(datasource.workspace_id).or_default();
        if existing.iter().any(|d| d.name == datasource.name) {
            return Err(StoreError::Conflict {
                name: datasource.name,
            });
        }

        let datasource = Datasource {
            id: DatasourceId::new(),
            workspace_id: datasource.workspace_id,
            name: datasource.name,
            datasource_type: datasource.datasource_type,
            encrypted_credentials: datasource.encrypted_credentials,
            created_at: Utc::now(),
        };
        existing.push(datasource.clone());
        Ok(datasource)
    }

    async fn materialize_application(
        &self,
        draft_id: DraftId,
        bindings: BTreeMap<String, Option<DatasourceId>>,
        git: Option<GitLink>,
    ) -> StoreResult<Application> {
        let mut state = self.state.write().await;

        // Validate everything before mutating anything
        let draft = state
            .drafts
            .get(&draft_id)
            .ok_or_else(|| StoreError::NotFound(format!("draft {}", draft_id)))?;
        let known = state
            .datasources
            .get(&draft.workspace_id)
            .map(|list| list.iter().map(|d| d.id).collect::<Vec<_>>())
            .unwrap_or_default();
        if let Some((name, _)) = bindings
            .iter()
            .find(|(_, id)| id.is_some_and(|id| !known.contains(&id)))
        {
            return Err(StoreError::NotFound(format!(
                "datasource bound to '{}'",
                name
            )));
        }

        let Some(draft) = state.drafts.remove(&draft_id) else {
            return Err(StoreError::NotFound(format!("draft {}", draft_id)));
        };
        let application = Application {
            id: ApplicationId(draft.id.0),
            workspace_id: draft.workspace_id,
            name: draft.name,
            datasource_bindings: bindings,
            git,
            created_at: Utc::now(),
        };
        state
            .applications
            .entry(application.workspace_id)
            .or_default()
            .push(application.clone());

        Ok(application)
    }

    async fn discard_draft(&self, draft_id: DraftId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .drafts
            .remove(&draft_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("draft {}", draft_id)))
    }

    async fn list_applications(&self, workspace_id: WorkspaceId) -> StoreResult<Vec<Application>> {
        let state = self.state.read().await;
        Ok(state
            .applications
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }
}
