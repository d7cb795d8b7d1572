use axum::{routing::get, Json, Router};
use clap::Args;
use relink_core::{CredentialCipher, ImportConfig, ServerConfig};
use relink_import::handlers::{configure_routes, types::AppState, ImportApiDoc};
use relink_import::{ImportEvent, ImportOrchestrator, InMemoryWorkspaceStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use utoipa::OpenApi;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Retention clamped to between one second and a minute
fn sweep_interval(retention: Duration) -> Duration {
    retention.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL)
}

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:8080", env = "RELINK_ADDRESS")]
    pub address: String,

    /// Upper bound in seconds for one datasource connection test
    #[arg(long, env = "RELINK_PROBE_TIMEOUT_SECS")]
    pub probe_timeout_secs: Option<u64>,

    /// Key used to encrypt stored credentials (64 hex characters)
    #[arg(long, env = "RELINK_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = self.server_config()?;
        let cipher = Arc::new(CredentialCipher::new(&config.encryption_key)?);

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(serve(config, cipher))
    }

    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut import = ImportConfig::from_env()?;
        if let Some(secs) = self.probe_timeout_secs {
            if secs == 0 {
                anyhow::bail!("--probe-timeout-secs must be greater than zero");
            }
            import = import.with_probe_timeout(Duration::from_secs(secs));
        }

        let encryption_key = match &self.encryption_key {
            Some(key) => key.clone(),
            None => {
                warn!(
                    "No encryption key configured; generated a random one. \
                     Credentials stored by this process cannot be read after restart"
                );
                CredentialCipher::generate_key()
            }
        };

        Ok(ServerConfig::new(self.address.clone(), encryption_key, import))
    }
}

fn build_router(orchestrator: Arc<ImportOrchestrator>) -> Router {
    let api = configure_routes().with_state(Arc::new(AppState {
        import_orchestrator: orchestrator,
    }));

    Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ImportApiDoc::openapi()) }),
        )
        .merge(api)
        .layer(TraceLayer::new_for_http())
}

async fn serve(config: ServerConfig, cipher: Arc<CredentialCipher>) -> anyhow::Result<()> {
    let probes = relink_probes::registry_with_timeout(config.import.probe_timeout());
    let orchestrator = Arc::new(ImportOrchestrator::new(
        Arc::new(InMemoryWorkspaceStore::new()),
        probes,
        cipher,
        &config.import,
    ));

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Import event log skipped {} events", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                ImportEvent::ReconnectionChanged { draft_id, record } => debug!(
                    "Import {}: datasource '{}' is {}",
                    draft_id, record.datasource_name, record.status
                ),
                ImportEvent::ImportFinalized { draft_id, result } => info!(
                    "Import {} finalized as application {:?} ({} unresolved)",
                    draft_id, result.application_id, result.unresolved_count
                ),
                ImportEvent::ImportAborted { draft_id } => info!("Import {} aborted", draft_id),
            }
        }
    });

    let sweeper = orchestrator.clone();
    let interval = sweep_interval(config.import.session_retention());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweeper.evict_finished().await;
        }
    });

    let app = build_router(orchestrator);
    let listener = TcpListener::bind(&config.address).await?;
    info!("Relink API listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(probe_timeout_secs: Option<u64>, encryption_key: Option<&str>) -> ServeCommand {
        ServeCommand {
            address: "127.0.0.1:0".to_string(),
            probe_timeout_secs,
            encryption_key: encryption_key.map(str::to_string),
        }
    }

    #[test]
    fn test_flag_overrides_probe_timeout() {
        let config = command(Some(3), None).server_config().unwrap();

        assert_eq!(config.import.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.address, "127.0.0.1:0");
    }

    #[test]
    fn test_missing_key_is_generated() {
        let config = command(None, None).server_config().unwrap();

        assert_eq!(config.encryption_key.len(), 64);
        assert!(CredentialCipher::new(&config.encryption_key).is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(command(Some(0), None).server_config().is_err());
    }

    #[test]
    fn test_sweep_interval_is_bounded() {
        assert_eq!(sweep_interval(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(sweep_interval(Duration::from_secs(20)), Duration::from_secs(20));
        assert_eq!(sweep_interval(Duration::from_secs(3600)), MAX_SWEEP_INTERVAL);
    }

    #[test]
    fn test_explicit_key_is_kept() {
        let key = "a".repeat(64);

        let config = command(None, Some(&key)).server_config().unwrap();

        assert_eq!(config.encryption_key, key);
    }
}
