//! Field Permission Auditor
//!
//! Audits field-level access from an exported permission snapshot.

use clap::{Parser, Subcommand};
use perm_auditor::{
    AuditPipeline, FieldSelection, ObjectSelection, RunOutcome, SnapshotSource,
    config::{LogFormat, load_config},
    report::{OutputFormat, render_field, render_matrix, render_objects},
};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Field Permission Auditor - who can read or edit a field, and why
#[derive(Parser, Debug)]
#[command(name = "perm-auditor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "PERM_AUDITOR_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "PERM_AUDITOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Permission snapshot to audit; overrides source.snapshot
    #[arg(short, long, global = true, env = "PERM_AUDITOR_SNAPSHOT")]
    snapshot: Option<String>,

    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List objects available for auditing
    Objects,

    /// Show the field × profile matrix of an object
    Matrix {
        /// Object API name
        #[arg(short, long)]
        object: String,

        /// Only show these profiles (id or name); repeatable
        #[arg(short, long = "principal")]
        principals: Vec<String>,
    },

    /// Show which profiles, permission sets and users can access a field
    Field {
        /// Object API name
        #[arg(short, long)]
        object: String,

        /// Field API name
        #[arg(short, long)]
        field: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Pick up a local .env before reading PERM_AUDITOR__* overrides
    let _ = dotenvy::dotenv();

    let loaded = load_config(args.config.as_deref());

    // Initialize logging
    let (level, log_format) = match &loaded {
        Ok(config) => (
            args.log_level.clone().unwrap_or_else(|| config.logging.level.clone()),
            config.logging.format,
        ),
        Err(_) => (
            args.log_level.clone().unwrap_or_else(|| "info".to_string()),
            LogFormat::Pretty,
        ),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    let json = log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();

    debug!(version = env!("CARGO_PKG_VERSION"), "Starting perm-auditor");

    // Load configuration
    let config = loaded.inspect_err(|e| error!(error = %e, "Failed to load configuration"))?;

    // Open the permission source
    let snapshot = match args.snapshot.as_deref() {
        Some(path) => shellexpand::tilde(path).into_owned(),
        None => config
            .source
            .require_snapshot()
            .inspect_err(|e| error!(error = %e, "No permission snapshot configured"))?,
    };
    let source = Arc::new(
        SnapshotSource::load(&snapshot)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to load permission snapshot"))?,
    );

    let pipeline = AuditPipeline::from_config(source, &config)
        .inspect_err(|e| error!(error = %e, "Failed to create audit pipeline"))?;

    let output = match args.command {
        Command::Objects => {
            let objects = pipeline.list_target_objects().await?;
            render_objects(&objects, args.format)?
        }
        Command::Matrix { object, principals } => {
            let selection = ObjectSelection::new(object).with_principals(principals);
            match pipeline.audit_object(selection).await? {
                RunOutcome::Published(audit) => render_matrix(&audit, args.format)?,
                RunOutcome::Discarded(stale) => anyhow::bail!(stale),
            }
        }
        Command::Field { object, field } => {
            match pipeline.audit_field(FieldSelection::new(object, field)).await? {
                RunOutcome::Published(audit) => render_field(&audit, args.format)?,
                RunOutcome::Discarded(stale) => anyhow::bail!(stale),
            }
        }
    };

    println!("{}", output);

    let metrics = pipeline.metrics().snapshot();
    info!(
        runs = metrics.runs_started,
        dropped_unknown_fields = metrics.dropped.unknown_fields,
        dropped_unknown_principals = metrics.dropped.unknown_principals,
        dropped_malformed_assignments = metrics.dropped.malformed_assignments,
        "Audit complete"
    );

    Ok(())
}
