//! Import orchestrator service
//!
//! Owns the import sessions and dispatches commands against them. Each import
//! moves `Uploaded → Parsed → Resolving` on start and ends `Finalized` or
//! `Aborted`; reconnect and skip only run while it is `Resolving`. Ended
//! imports stay queryable for the configured retention, then
//! [`ImportOrchestrator::evict_finished`] drops them.

use chrono::{TimeDelta, Utc};
use relink_core::{CredentialCipher, ImportConfig};
use relink_import_types::{
    Application, BundleSource, Datasource, DatasourceCredentials, DraftId, ImportError,
    ImportResult, ImportState, PendingReconnection, ProbeRegistry, Workspace, WorkspaceId,
    WorkspaceStore,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::finalizer::ImportFinalizer;
use super::importer::BundleImporter;
use super::resolver::{resolve_bindings, resolve_dependencies};
use super::session::ImportSession;
use super::validator::ReconnectionValidator;
use super::{ImportServiceError, ImportServiceResult};
use crate::handlers::types::ImportStatus;

const EVENT_CAPACITY: usize = 256;

/// Command against a running import
#[derive(Debug, Clone)]
pub enum ImportCommand {
    Reconnect {
        datasource_name: String,
        credentials: DatasourceCredentials,
    },
    Skip {
        datasource_name: String,
    },
    Finalize,
    Cancel,
}

impl ImportCommand {
    fn name(&self) -> &'static str {
        match self {
            ImportCommand::Reconnect { .. } => "reconnect",
            ImportCommand::Skip { .. } => "skip",
            ImportCommand::Finalize => "finalize",
            ImportCommand::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Reconnected(Datasource),
    Skipped(PendingReconnection),
    Finalized(ImportResult),
    Cancelled(ImportStatus),
}

/// Notifications for presentation adapters. Nothing feeds these back into
/// import state.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    ReconnectionChanged {
        draft_id: DraftId,
        record: PendingReconnection,
    },
    ImportFinalized {
        draft_id: DraftId,
        result: ImportResult,
    },
    ImportAborted {
        draft_id: DraftId,
    },
}

#[derive(Default)]
struct SessionTable {
    by_draft: HashMap<DraftId, Arc<ImportSession>>,
    /// Most recent import started by each user
    latest: HashMap<String, DraftId>,
}

impl SessionTable {
    fn active_for(&self, user_id: &str) -> Option<DraftId> {
        let draft_id = self.latest.get(user_id)?;
        self.by_draft
            .get(draft_id)
            .filter(|s| !s.state().is_terminal())
            .map(|s| s.draft_id)
    }

    fn insert(&mut self, session: Arc<ImportSession>) {
        self.latest.insert(session.user_id.clone(), session.draft_id);
        self.by_draft.insert(session.draft_id, session);
    }

    /// Drop ended sessions untouched since `cutoff`
    fn evict_ended_before(&mut self, cutoff: relink_core::UtcDateTime) -> usize {
        let before = self.by_draft.len();
        self.by_draft
            .retain(|_, s| !(s.state().is_terminal() && s.updated_at() <= cutoff));
        let by_draft = &self.by_draft;
        self.latest.retain(|_, draft_id| by_draft.contains_key(draft_id));
        before - self.by_draft.len()
    }
}

/// Import orchestrator coordinating all import operations
pub struct ImportOrchestrator {
    store: Arc<dyn WorkspaceStore>,
    importer: BundleImporter,
    validator: ReconnectionValidator,
    finalizer: ImportFinalizer,
    sessions: RwLock<SessionTable>,
    session_retention: TimeDelta,
    events: broadcast::Sender<ImportEvent>,
}

impl ImportOrchestrator {
    pub fn new(
        store: Arc<dyn WorkspaceStore>,
        probes: ProbeRegistry,
        cipher: Arc<CredentialCipher>,
        config: &ImportConfig,
    ) -> Self {
        info!(
            "Import orchestrator ready: probes for {:?}, {}s probe timeout",
            probes.supported_types(),
            config.probe_timeout_secs
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            importer: BundleImporter::new(store.clone(), config),
            validator: ReconnectionValidator::new(
                store.clone(),
                probes,
                cipher,
                config.probe_timeout(),
            ),
            finalizer: ImportFinalizer::new(store.clone(), config.default_git_branch.clone()),
            store,
            sessions: RwLock::new(SessionTable::default()),
            session_retention: TimeDelta::from_std(config.session_retention())
                .unwrap_or(TimeDelta::MAX),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ImportEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Forget finalized and cancelled imports older than the retention.
    /// Returns how many were dropped.
    pub async fn evict_finished(&self) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.session_retention) else {
            return 0;
        };
        let evicted = self.sessions.write().await.evict_ended_before(cutoff);
        if evicted > 0 {
            debug!("Evicted {} ended import session(s)", evicted);
        }
        evicted
    }

    pub async fn create_workspace(&self, name: &str) -> ImportServiceResult<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ImportServiceError::Validation(
                "workspace name must not be empty".to_string(),
            ));
        }
        let workspace = self
            .store
            .create_workspace(name)
            .await
            .map_err(ImportError::from)?;
        info!("Created workspace '{}' ({})", workspace.name, workspace.id);
        Ok(workspace)
    }

    pub async fn list_applications(
        &self,
        workspace_id: WorkspaceId,
    ) -> ImportServiceResult<Vec<Application>> {
        if !self
            .store
            .workspace_exists(workspace_id)
            .await
            .map_err(ImportError::from)?
        {
            return Err(ImportError::WorkspaceNotFound(workspace_id).into());
        }
        Ok(self
            .store
            .list_applications(workspace_id)
            .await
            .map_err(ImportError::from)?)
    }

    /// Upload a bundle and open an import session for `user_id`
    pub async fn start_import(
        &self,
        user_id: &str,
        workspace_id: WorkspaceId,
        payload: &[u8],
        source: BundleSource,
    ) -> ImportServiceResult<ImportStatus> {
        debug!(
            "Starting import into workspace {} for user {}",
            workspace_id, user_id
        );
        self.ensure_no_active_import(user_id).await?;

        let mut state = ImportState::Uploaded;
        let parsed = self
            .importer
            .import(workspace_id, payload, source.clone())
            .await?;
        state.advance(ImportState::Parsed, "parse")?;

        let existing = self
            .store
            .list_datasources(workspace_id)
            .await
            .map_err(ImportError::from)?;
        let pending = resolve_dependencies(&parsed.references, &existing);
        let bound = resolve_bindings(&parsed.references, &existing);
        state.advance(ImportState::Resolving, "resolve")?;

        let session = Arc::new(ImportSession::new(
            parsed.draft.id,
            user_id,
            workspace_id,
            parsed.draft.name.clone(),
            source,
            parsed.validation,
            bound,
            pending,
            state,
        ));

        {
            let mut sessions = self.sessions.write().await;
            // A concurrent start for the same user may have won while we parsed
            if let Some(active) = sessions.active_for(user_id) {
                drop(sessions);
                if let Err(e) = self.store.discard_draft(parsed.draft.id).await {
                    warn!("Failed to discard draft {}: {}", parsed.draft.id, e);
                }
                return Err(ImportError::ImportInProgress(active).into());
            }
            sessions.insert(session.clone());
        }

        info!(
            "Import {} of '{}' is resolving: {} datasource(s) to reconnect, {} already present",
            session.draft_id,
            session.application_name,
            session.slots.len(),
            session.bound.len()
        );
        Ok(ImportStatus::from_session(&session))
    }

    async fn ensure_no_active_import(&self, user_id: &str) -> ImportServiceResult<()> {
        let active = self.sessions.read().await.active_for(user_id);
        match active {
            Some(active) => {
                warn!("User {} already has import {} in progress", user_id, active);
                Err(ImportError::ImportInProgress(active).into())
            }
            None => Ok(()),
        }
    }

    async fn session(
        &self,
        user_id: &str,
        draft_id: DraftId,
    ) -> ImportServiceResult<Arc<ImportSession>> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions
                .by_draft
                .get(&draft_id)
                .cloned()
                .ok_or(ImportError::SessionNotFound(draft_id))?
        };

        // Verify user owns this session
        if session.user_id != user_id {
            warn!(
                "User {} attempted to access import {} owned by user {}",
                user_id, draft_id, session.user_id
            );
            return Err(ImportError::SessionNotFound(draft_id).into());
        }

        Ok(session)
    }

    pub async fn status(&self, user_id: &str, draft_id: DraftId) -> ImportServiceResult<ImportStatus> {
        let session = self.session(user_id, draft_id).await?;
        Ok(ImportStatus::from_session(&session))
    }

    pub async fn dispatch(
        &self,
        user_id: &str,
        draft_id: DraftId,
        command: ImportCommand,
    ) -> ImportServiceResult<CommandOutcome> {
        let session = self.session(user_id, draft_id).await?;
        debug!("Dispatching {} for import {}", command.name(), draft_id);

        match command {
            ImportCommand::Reconnect {
                datasource_name,
                credentials,
            } => self
                .handle_reconnect(&session, &datasource_name, credentials)
                .await
                .map(CommandOutcome::Reconnected),
            ImportCommand::Skip { datasource_name } => self
                .handle_skip(&session, &datasource_name)
                .await
                .map(CommandOutcome::Skipped),
            ImportCommand::Finalize => self
                .handle_finalize(&session)
                .await
                .map(CommandOutcome::Finalized),
            ImportCommand::Cancel => self
                .handle_cancel(&session)
                .await
                .map(CommandOutcome::Cancelled),
        }
    }

    pub async fn reconnect(
        &self,
        user_id: &str,
        draft_id: DraftId,
        datasource_name: &str,
        credentials: DatasourceCredentials,
    ) -> ImportServiceResult<Datasource> {
        let session = self.session(user_id, draft_id).await?;
        self.handle_reconnect(&session, datasource_name, credentials)
            .await
    }

    pub async fn skip(
        &self,
        user_id: &str,
        draft_id: DraftId,
        datasource_name: &str,
    ) -> ImportServiceResult<PendingReconnection> {
        let session = self.session(user_id, draft_id).await?;
        self.handle_skip(&session, datasource_name).await
    }

    pub async fn finalize(
        &self,
        user_id: &str,
        draft_id: DraftId,
    ) -> ImportServiceResult<ImportResult> {
        let session = self.session(user_id, draft_id).await?;
        self.handle_finalize(&session).await
    }

    pub async fn cancel(&self, user_id: &str, draft_id: DraftId) -> ImportServiceResult<ImportStatus> {
        let session = self.session(user_id, draft_id).await?;
        self.handle_cancel(&session).await
    }

    async fn handle_reconnect(
        &self,
        session: &ImportSession,
        datasource_name: &str,
        credentials: DatasourceCredentials,
    ) -> ImportServiceResult<Datasource> {
        let _phase = session.enter_phase().await;
        session.ensure_resolving("reconnect")?;
        let slot = session.slot(datasource_name)?;

        let outcome = self
            .validator
            .resolve(session.workspace_id, slot, credentials)
            .await;
        session.touch();
        self.publish(ImportEvent::ReconnectionChanged {
            draft_id: session.draft_id,
            record: slot.snapshot(),
        });

        Ok(outcome?)
    }

    async fn handle_skip(
        &self,
        session: &ImportSession,
        datasource_name: &str,
    ) -> ImportServiceResult<PendingReconnection> {
        let _phase = session.enter_phase().await;
        session.ensure_resolving("skip")?;
        let slot = session.slot(datasource_name)?;

        let _gate = slot.enter().await;
        let record = slot.mark_skipped()?;
        session.touch();
        info!(
            "Skipped datasource '{}' for import {}",
            record.datasource_name, session.draft_id
        );
        self.publish(ImportEvent::ReconnectionChanged {
            draft_id: session.draft_id,
            record: record.clone(),
        });

        Ok(record)
    }

    async fn handle_finalize(&self, session: &ImportSession) -> ImportServiceResult<ImportResult> {
        let result = self.finalizer.finalize(session).await?;
        self.publish(ImportEvent::ImportFinalized {
            draft_id: session.draft_id,
            result: result.clone(),
        });
        Ok(result)
    }

    async fn handle_cancel(&self, session: &ImportSession) -> ImportServiceResult<ImportStatus> {
        {
            let _barrier = session.barrier().await;
            session.advance(ImportState::Aborted, "cancel")?;
        }

        // Datasources persisted so far stay in the workspace
        if let Err(e) = self.store.discard_draft(session.draft_id).await {
            warn!("Failed to discard draft {}: {}", session.draft_id, e);
        }
        info!("Cancelled import {}", session.draft_id);
        self.publish(ImportEvent::ImportAborted {
            draft_id: session.draft_id,
        });

        Ok(ImportStatus::from_session(session))
    }
}
