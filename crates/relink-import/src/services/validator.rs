//! Reconnection validator
//!
//! Turns user-supplied credentials into a persisted datasource: structural
//! checks, a connectivity probe under a timeout, then an insert-if-absent
//! write while holding the workspace-wide lock for the datasource name.
//! Losing that write to a datasource of the same name and type binds the
//! existing one; a same-name datasource of another type is a conflict.

use relink_core::CredentialCipher;
use relink_import_types::{
    ConnectivityProbe, Datasource, DatasourceCredentials, DatasourceReference, ImportError,
    NewDatasource, ProbeRegistry, Result, StoreError, ValidationError, ValidationFailureReason,
    WorkspaceId, WorkspaceStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::locks::DatasourceLocks;
use super::session::ReconnectionSlot;

/// Fails the slot if the resolve future is dropped mid-probe
struct TestingGuard<'a> {
    slot: &'a ReconnectionSlot,
}

impl Drop for TestingGuard<'_> {
    fn drop(&mut self) {
        self.slot.abandon_test();
    }
}

pub struct ReconnectionValidator {
    store: Arc<dyn WorkspaceStore>,
    probes: ProbeRegistry,
    locks: DatasourceLocks,
    cipher: Arc<CredentialCipher>,
    probe_timeout: Duration,
}

impl ReconnectionValidator {
    pub fn new(
        store: Arc<dyn WorkspaceStore>,
        probes: ProbeRegistry,
        cipher: Arc<CredentialCipher>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            store,
            probes,
            locks: DatasourceLocks::new(),
            cipher,
            probe_timeout,
        }
    }

    /// Validate `credentials` for the slot's datasource and persist it.
    ///
    /// Returns the stored datasource straight away if the slot is already
    /// resolved; the new credentials are ignored in that case.
    pub async fn resolve(
        &self,
        workspace_id: WorkspaceId,
        slot: &ReconnectionSlot,
        credentials: DatasourceCredentials,
    ) -> Result<Datasource> {
        let _gate = slot.enter().await;

        if let Some(existing) = slot.datasource() {
            debug!(
                "Datasource '{}' already resolved, ignoring new credentials",
                existing.name
            );
            return Ok(existing);
        }

        let reference = slot.reference();
        let probe = match self.precheck(&reference, &credentials) {
            Ok(probe) => probe,
            Err(reason) => return Err(self.reject(slot, &reference, reason)),
        };

        slot.begin_test()?;
        let _testing = TestingGuard { slot };
        let outcome = self
            .test_and_persist(workspace_id, &reference, &credentials, probe)
            .await;

        match outcome {
            Ok(datasource) => {
                info!(
                    "Reconnected datasource '{}' ({}) in workspace {}",
                    datasource.name, datasource.datasource_type, workspace_id
                );
                slot.mark_resolved(datasource.clone());
                Ok(datasource)
            }
            Err(err) => {
                let message = match &err {
                    ImportError::Validation(v) => v.reason.to_string(),
                    other => other.to_string(),
                };
                warn!(
                    "Reconnection of datasource '{}' failed: {}",
                    reference.name, message
                );
                slot.mark_failed(message);
                Err(err)
            }
        }
    }

    fn precheck(
        &self,
        reference: &DatasourceReference,
        credentials: &DatasourceCredentials,
    ) -> std::result::Result<Arc<dyn ConnectivityProbe>, ValidationFailureReason> {
        let actual = credentials.datasource_type();
        if actual != reference.datasource_type {
            return Err(ValidationFailureReason::CredentialTypeMismatch {
                expected: reference.datasource_type,
                actual,
            });
        }

        credentials
            .validate()
            .map_err(ValidationFailureReason::InvalidCredentials)?;

        self.probes
            .get(reference.datasource_type)
            .ok_or(ValidationFailureReason::UnsupportedType(
                reference.datasource_type,
            ))
    }

    fn reject(
        &self,
        slot: &ReconnectionSlot,
        reference: &DatasourceReference,
        reason: ValidationFailureReason,
    ) -> ImportError {
        warn!(
            "Rejected credentials for datasource '{}': {}",
            reference.name, reason
        );
        slot.mark_failed(reason.to_string());
        ValidationError::new(reference.name.clone(), reason).into()
    }

    async fn test_and_persist(
        &self,
        workspace_id: WorkspaceId,
        reference: &DatasourceReference,
        credentials: &DatasourceCredentials,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Datasource> {
        debug!(
            "Probing datasource '{}' ({}) with {}s timeout",
            reference.name,
            reference.datasource_type,
            self.probe_timeout.as_secs()
        );

        match tokio::time::timeout(self.probe_timeout, probe.probe(credentials)).await {
            Err(_) => {
                return Err(
                    ValidationError::new(&reference.name, ValidationFailureReason::Timeout).into(),
                )
            }
            Ok(Err(e)) => {
                return Err(ValidationError::new(
                    &reference.name,
                    ValidationFailureReason::ProbeFailed(e.to_string()),
                )
                .into())
            }
            Ok(Ok(())) => {}
        }

        let encrypted_credentials = self.cipher.encrypt_json(credentials)?;

        let lock = self.locks.acquire(workspace_id, &reference.name);
        let _held = lock.lock().await;
        let persisted = self
            .store
            .persist_datasource(NewDatasource {
                workspace_id,
                name: reference.name.clone(),
                datasource_type: reference.datasource_type,
                encrypted_credentials,
            })
            .await;

        match persisted {
            Ok(datasource) => Ok(datasource),
            Err(StoreError::Conflict { name }) => {
                self.bind_existing(workspace_id, reference)
                    .await?
                    .ok_or(ImportError::ConflictingDatasourceName(name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Datasource already stored under the reference's name and type
    async fn bind_existing(
        &self,
        workspace_id: WorkspaceId,
        reference: &DatasourceReference,
    ) -> Result<Option<Datasource>> {
        let existing = self
            .store
            .list_datasources(workspace_id)
            .await?
            .into_iter()
            .find(|d| d.reference() == *reference);

        if let Some(datasource) = &existing {
            info!(
                "Datasource '{}' already exists in workspace {}, binding {} and keeping its credentials",
                reference.name, workspace_id, datasource.id
            );
        }
        Ok(existing)
    }
}
