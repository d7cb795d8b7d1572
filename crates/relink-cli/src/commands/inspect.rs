use clap::Args;
use relink_core::ImportConfig;
use relink_import_types::{
    default_rules, validate_bundle, DatasourceReference, ImportBundle, ValidationReport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Args)]
pub struct InspectCommand {
    /// Exported application bundle (JSON)
    pub path: PathBuf,

    /// Newest bundle server schema version to accept
    #[arg(long, env = "RELINK_MAX_SCHEMA_VERSION")]
    pub max_schema_version: Option<u32>,
}

/// What an import of the bundle would have to reconnect
#[derive(Debug, Serialize)]
struct InspectReport {
    application_name: String,
    server_schema_version: u32,
    datasources: Vec<DatasourceReference>,
    can_proceed: bool,
    validation: ValidationReport,
}

impl InspectCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let report = self.inspect()?;
        if !report.can_proceed {
            warn!("{} would be rejected on import", self.path.display());
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    fn inspect(&self) -> anyhow::Result<InspectReport> {
        let max_schema_version = match self.max_schema_version {
            Some(version) => version,
            None => ImportConfig::from_env()?.max_schema_version,
        };
        inspect_file(&self.path, max_schema_version)
    }
}

fn inspect_file(path: &Path, max_schema_version: u32) -> anyhow::Result<InspectReport> {
    let payload = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    debug!("Read {} bytes from {}", payload.len(), path.display());

    let bundle = ImportBundle::parse(&payload)?;
    let validation = validate_bundle(&bundle, &default_rules(max_schema_version));

    Ok(InspectReport {
        application_name: bundle.application_name().to_string(),
        server_schema_version: bundle.server_schema_version,
        datasources: bundle.references()?,
        can_proceed: validation.can_proceed(),
        validation,
    })
}
