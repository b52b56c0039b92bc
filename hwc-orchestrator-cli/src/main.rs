//! Command-line entry point for Huawei Cloud Orchestrator
//!
//! Reconciles one resource per invocation. Results go to stdout as JSON, logs
//! go to stderr (`RUST_LOG` overrides the default `info` filter).

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hwc_orchestrator_core::{ReconcileError, ResourceReconciler, ServiceContext};
use hwc_orchestrator_provider::{
    HuaweicloudClient, ResourceSpec, all_kind_metadata, create_mapper, supported_kinds,
};

use config::{Config, Credentials};

const DEFAULT_CONFIG: &str = "hwc-orchestrator.toml";

#[derive(Parser)]
#[command(name = "hwc-orchestrator", version)]
#[command(about = "Reconcile Huawei Cloud CDN and OMS resources against a desired state", long_about = None)]
struct Cli {
    /// Configuration file (default: ./hwc-orchestrator.toml when present)
    #[arg(short, long, env = "HWC_ORCHESTRATOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the resource described by a spec file (JSON or TOML)
    Apply {
        spec: PathBuf,
        /// Record the resulting remote id in the spec file
        #[arg(long)]
        save_id: bool,
    },
    /// Show the current remote state of a resource
    Read { kind: String, id: String },
    /// Delete a resource, stopping or disabling it first when needed
    Destroy { kind: String, id: String },
    /// List every resource of a kind
    List { kind: String },
    /// Show the supported resource kinds
    Kinds,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the running operation");
            trigger.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let expected = e
                .downcast_ref::<ReconcileError>()
                .is_some_and(ReconcileError::is_expected);
            if expected {
                tracing::warn!("{e:#}");
            } else {
                tracing::error!("{e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    if matches!(cli.command, Commands::Kinds) {
        return print_json(&all_kind_metadata());
    }

    let config = match &cli.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(Path::new(DEFAULT_CONFIG), false)?,
    };
    let reconciler = build_reconciler(&config)?;

    match cli.command {
        Commands::Apply { spec, save_id } => {
            let mut desired = load_spec(&spec)?;
            validate_kind(&config, &desired.kind)?;
            let observed = reconciler.apply(&desired, cancel).await?;
            if save_id && desired.remote_id.as_deref() != Some(observed.remote_id.as_str()) {
                desired.remote_id = Some(observed.remote_id.clone());
                save_spec(&spec, &desired)?;
                tracing::info!("Recorded remote id {} in {}", observed.remote_id, spec.display());
            }
            print_json(&observed)
        }
        Commands::Read { kind, id } => {
            validate_kind(&config, &kind)?;
            match reconciler.read(&kind, &id, cancel).await? {
                Some(observed) => print_json(&observed),
                None => anyhow::bail!("{kind} {id} does not exist"),
            }
        }
        Commands::Destroy { kind, id } => {
            validate_kind(&config, &kind)?;
            reconciler.delete(&kind, &id, cancel).await?;
            Ok(())
        }
        Commands::List { kind } => {
            validate_kind(&config, &kind)?;
            print_json(&reconciler.list(&kind, cancel).await?)
        }
        Commands::Kinds => Ok(()),
    }
}

fn build_reconciler(config: &Config) -> Result<ResourceReconciler> {
    let credentials = Credentials::from_env()?;
    let mut builder =
        HuaweicloudClient::builder(credentials.access_key_id, credentials.secret_access_key)
            .region(config.region());
    if let Some(retries) = config.max_retries {
        builder = builder.max_retries(retries);
    }
    let client = builder.build()?;

    // kinds that cannot be built here (OMS without a project) are reported by validate_kind
    let project = config.project_context();
    let mappers = supported_kinds()
        .into_iter()
        .filter_map(|kind| create_mapper(kind, &project).ok())
        .collect();
    let ctx = ServiceContext::with_mappers(Arc::new(client), mappers);
    Ok(ResourceReconciler::new(Arc::new(ctx)).with_timeouts(config.timeout_overrides()))
}

fn validate_kind(config: &Config, kind: &str) -> Result<()> {
    create_mapper(kind, &config.project_context())?;
    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

fn load_spec(path: &Path) -> Result<ResourceSpec> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let spec = if is_toml(path) {
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(spec)
}

fn save_spec(path: &Path, spec: &ResourceSpec) -> Result<()> {
    let text = if is_toml(path) {
        toml::to_string_pretty(spec)?
    } else {
        serde_json::to_string_pretty(spec)? + "\n"
    };
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_apply_with_global_config() {
        let cli = Cli::try_parse_from([
            "hwc-orchestrator",
            "apply",
            "domain.toml",
            "--save-id",
            "--config",
            "prod.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(
            cli.command,
            Commands::Apply { ref spec, save_id: true } if spec == Path::new("domain.toml")
        ));
    }

    #[test]
    fn spec_files_round_trip_in_both_formats() {
        let dir = std::env::temp_dir().join(format!("hwc-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let spec = ResourceSpec::new("cdn_domain")
            .with_field("name", serde_json::json!("img.example.com"))
            .with_remote_id("abc");

        for file in ["spec.toml", "spec.json"] {
            let path = dir.join(file);
            save_spec(&path, &spec).unwrap();
            assert_eq!(load_spec(&path).unwrap(), spec);
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn oms_kind_needs_project() {
        let config = Config::default();
        assert!(validate_kind(&config, "cdn_domain").is_ok());
        assert!(validate_kind(&config, "oms_migration_task").is_err());
        assert!(validate_kind(&config, "vpc").is_err());
    }
}
