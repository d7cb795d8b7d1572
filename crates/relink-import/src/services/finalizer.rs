//! Import finalizer

use relink_import_types::{
    BundleSource, DatasourceId, GitLink, ImportError, ImportResult, ImportState,
    ReconnectionStatus, Result, WorkspaceStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::session::ImportSession;

pub struct ImportFinalizer {
    store: Arc<dyn WorkspaceStore>,
    default_git_branch: String,
}

impl ImportFinalizer {
    pub fn new(store: Arc<dyn WorkspaceStore>, default_git_branch: impl Into<String>) -> Self {
        Self {
            store,
            default_git_branch: default_git_branch.into(),
        }
    }

    /// Materialize the session's draft as a visible application.
    ///
    /// Waits for every in-flight reconnection first. Fails with
    /// `UnresolvedDependencies` while any record is not resolved or skipped;
    /// the draft is kept and finalize can be called again.
    pub async fn finalize(&self, session: &ImportSession) -> Result<ImportResult> {
        let _barrier = session.barrier().await;
        session.ensure_resolving("finalize")?;

        let pending = session.unsettled();
        if !pending.is_empty() {
            warn!(
                "Finalize of import {} blocked by {} unresolved datasource(s): {}",
                session.draft_id,
                pending.len(),
                pending.join(", ")
            );
            return Err(ImportError::UnresolvedDependencies { pending });
        }

        let mut bindings: BTreeMap<String, Option<DatasourceId>> = session
            .bound
            .iter()
            .map(|(name, id)| (name.clone(), Some(*id)))
            .collect();
        let mut skipped = 0;
        for record in session.records() {
            if record.status == ReconnectionStatus::Skipped {
                skipped += 1;
            }
            bindings.insert(record.datasource_name, record.datasource_id);
        }

        let git = self.git_link(&session.source);
        let application = self
            .store
            .materialize_application(session.draft_id, bindings, git)
            .await?;

        let result = ImportResult {
            success: true,
            application_id: Some(application.id),
            unresolved_count: skipped,
        };
        session.advance(ImportState::Finalized, "finalize")?;
        session.set_result(result.clone());

        info!(
            "Finalized import {} as application {} ('{}'), {} datasource(s) skipped",
            session.draft_id, application.id, application.name, skipped
        );
        Ok(result)
    }

    fn git_link(&self, source: &BundleSource) -> Option<GitLink> {
        match source {
            BundleSource::Json => None,
            BundleSource::Git {
                repository_url,
                branch,
            } => {
                let branch = branch
                    .as_deref()
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .unwrap_or(self.default_git_branch.as_str());
                Some(GitLink::new(repository_url.clone(), branch))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryWorkspaceStore;
    use relink_import_types::{
        DatasourceReference, DatasourceType, NewDatasource, NewDraft, PendingReconnection,
        ValidationReport,
    };

    async fn session_with(
        store: &InMemoryWorkspaceStore,
        source: BundleSource,
        names: &[&str],
    ) -> ImportSession {
        let workspace = store.create_workspace("ted").await.unwrap();
        let references: Vec<_> = names
            .iter()
            .map(|n| DatasourceReference::new(*n, DatasourceType::Postgres))
            .collect();
        let draft = store
            .create_draft_application(NewDraft {
                workspace_id: workspace.id,
                name: "gitImport".to_string(),
                source: source.clone(),
                references: references.clone(),
            })
            .await
            .unwrap();
        ImportSession::new(
            draft.id,
            "user-1",
            workspace.id,
            draft.name,
            source,
            ValidationReport::new(),
            BTreeMap::new(),
            references.iter().map(PendingReconnection::new).collect(),
            ImportState::Resolving,
        )
    }

    async fn resolve(store: &InMemoryWorkspaceStore, session: &ImportSession, name: &str) {
        let datasource = store
            .persist_datasource(NewDatasource {
                workspace_id: session.workspace_id,
                name: name.to_string(),
                datasource_type: DatasourceType::Postgres,
                encrypted_credentials: String::new(),
            })
            .await
            .unwrap();
        let slot = session.slot(name).unwrap();
        slot.begin_test().unwrap();
        slot.mark_resolved(datasource);
    }

    #[tokio::test]
    async fn test_early_finalize_lists_pending_and_keeps_draft() {
        // Arrange
        let store = Arc::new(InMemoryWorkspaceStore::new());
        let session = session_with(&store, BundleSource::Json, &["A", "B"]).await;
        resolve(&store, &session, "A").await;
        let finalizer = ImportFinalizer::new(store.clone(), "master");

        // Act
        let result = finalizer.finalize(&session).await;

        // Assert
        match result {
            Err(ImportError::UnresolvedDependencies { pending }) => {
                assert_eq!(pending, vec!["B".to_string()])
            }
            other => panic!("expected unresolved dependencies, got {:?}", other),
        }
        assert_eq!(session.state(), ImportState::Resolving);
        assert!(store.draft(session.draft_id).await.is_some());
    }

    #[tokio::test]
    async fn test_skipped_records_bind_to_none_and_are_counted() {
        // Arrange
        let store = Arc::new(InMemoryWorkspaceStore::new());
        let session = session_with(&store, BundleSource::Json, &["A", "B"]).await;
        resolve(&store, &session, "A").await;
        session.slot("B").unwrap().mark_skipped().unwrap();
        let finalizer = ImportFinalizer::new(store.clone(), "master");

        // Act
        let result = finalizer.finalize(&session).await.unwrap();

        // Assert
        assert!(result.success);
        assert_eq!(result.unresolved_count, 1);
        let apps = store.list_applications(session.workspace_id).await.unwrap();
        assert_eq!(apps[0].datasource_bindings.get("B"), Some(&None));
        assert!(apps[0].datasource_bindings["A"].is_some());
        assert_eq!(session.state(), ImportState::Finalized);
        assert_eq!(session.result(), Some(result));
    }

    #[tokio::test]
    async fn test_git_source_links_default_branch() {
        // Arrange
        let store = Arc::new(InMemoryWorkspaceStore::new());
        let source = BundleSource::Git {
            repository_url: "git@example.com:ted/app.git".to_string(),
            branch: None,
        };
        let session = session_with(&store, source, &[]).await;
        let finalizer = ImportFinalizer::new(store.clone(), "master");

        // Act
        finalizer.finalize(&session).await.unwrap();

        // Assert
        let apps = store.list_applications(session.workspace_id).await.unwrap();
        let git = apps[0].git.as_ref().unwrap();
        assert_eq!(git.branch, "master");
        assert_eq!(git.branches, vec!["master".to_string()]);
    }

    #[tokio::test]
    async fn test_second_finalize_is_rejected() {
        let store = Arc::new(InMemoryWorkspaceStore::new());
        let session = session_with(&store, BundleSource::Json, &[]).await;
        let finalizer = ImportFinalizer::new(store.clone(), "master");
        finalizer.finalize(&session).await.unwrap();

        let again = finalizer.finalize(&session).await;

        assert!(matches!(
            again,
            Err(ImportError::InvalidState {
                state: ImportState::Finalized,
                ..
            })
        ));
        assert_eq!(
            store.list_applications(session.workspace_id).await.unwrap().len(),
            1
        );
    }
}
