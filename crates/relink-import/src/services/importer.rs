//! Bundle importer
//!
//! Parses the uploaded payload, checks the destination workspace, runs the
//! pre-flight validation rules and creates the hidden draft application.

use relink_core::ImportConfig;
use relink_import_types::{
    default_rules, validate_bundle, BundleSource, DatasourceReference, DraftApplication,
    ImportBundle, ImportError, ImportValidationRule, NewDraft, Result, ValidationLevel,
    ValidationReport, WorkspaceId, WorkspaceStore,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output of a successful import step
#[derive(Debug, Clone)]
pub struct ParsedImport {
    pub draft: DraftApplication,
    pub references: Vec<DatasourceReference>,
    pub validation: ValidationReport,
}

pub struct BundleImporter {
    store: Arc<dyn WorkspaceStore>,
    rules: Vec<Box<dyn ImportValidationRule>>,
}

impl BundleImporter {
    pub fn new(store: Arc<dyn WorkspaceStore>, config: &ImportConfig) -> Self {
        Self {
            store,
            rules: default_rules(config.max_schema_version),
        }
    }

    pub async fn import(
        &self,
        workspace_id: WorkspaceId,
        payload: &[u8],
        source: BundleSource,
    ) -> Result<ParsedImport> {
        let bundle = ImportBundle::parse(payload)?;
        let references = bundle.references()?;
        debug!(
            "Parsed bundle '{}' with {} datasource reference(s)",
            bundle.application_name(),
            references.len()
        );

        if !self.store.workspace_exists(workspace_id).await? {
            return Err(ImportError::WorkspaceNotFound(workspace_id));
        }

        let validation = validate_bundle(&bundle, &self.rules);
        if !validation.can_proceed() {
            let failures = validation.failures_at_least(ValidationLevel::Error);
            warn!(
                "Bundle '{}' failed validation: {}",
                bundle.application_name(),
                failures.join("; ")
            );
            return Err(ImportError::ValidationFailed(failures.join("; ")));
        }
        for warning in validation.warnings() {
            warn!("Bundle '{}': {}", bundle.application_name(), warning);
        }

        let draft = self
            .store
            .create_draft_application(NewDraft {
                workspace_id,
                name: bundle.application_name().to_string(),
                source,
                references: references.clone(),
            })
            .await?;

        info!(
            "Created draft application {} ('{}') in workspace {}",
            draft.id, draft.name, workspace_id
        );

        Ok(ParsedImport {
            draft,
            references,
            validation,
        })
    }
}
