//! Relink CLI - single entrypoint for the import service
//!
//! `serve` runs the HTTP API; `inspect` checks a bundle file offline.

mod commands;

use clap::{Parser, Subcommand};
use commands::{InspectCommand, ServeCommand};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

const APP_TARGETS: &[&str] = &[
    "relink_cli",
    "relink_core",
    "relink_import",
    "relink_import_types",
    "relink_probes",
    "tower_http",
];

const NOISY_TARGETS: &[&str] = &[
    "sqlx", "mongodb", "h2", "hyper", "reqwest", "rustls",
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RELINK_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "RELINK_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Parse and validate a bundle file without importing it
    Inspect(InspectCommand),
}

/// Relink crates and request tracing at `level`, chatty dependencies at warn
fn default_filter(level: &str) -> String {
    APP_TARGETS
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .chain(NOISY_TARGETS.iter().map(|krate| format!("{}=warn", krate)))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG wins when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        EnvFilter::try_new(default_filter(log_level))
            .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", log_level, e))?
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Inspect(inspect_cmd) => inspect_cmd.execute(),
    }
}
