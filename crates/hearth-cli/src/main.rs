//! Hearth operator CLI.
//!
//! Each subcommand runs one orchestrator operation against the local Docker
//! daemon and prints the result as JSON on stdout. Logs go to stderr.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::HearthConfig;
use hearth_core::{OrchestratorError, PlaneCatalog, VpsOrchestrator};
use hearth_runtime::DockerRuntime;
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Hearth VPS lifecycle CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available planes
    Planes,

    /// Provision a new VPS
    Provision {
        /// Owner user ID
        owner: String,

        /// Display name the hostname is derived from
        username: String,

        /// Plane ID
        plane: String,
    },

    /// List instances
    List {
        /// Only instances of this owner
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Show one instance record
    Show {
        /// VPS hostname
        hostname: String,
    },

    /// Start a VPS
    Start {
        /// VPS hostname
        hostname: String,
    },

    /// Stop a VPS
    Stop {
        /// VPS hostname
        hostname: String,
    },

    /// Restart a VPS and renew its session
    Restart {
        /// VPS hostname
        hostname: String,
    },

    /// Stop a VPS and mark it suspended
    Suspend {
        /// VPS hostname
        hostname: String,
    },

    /// Start a suspended VPS
    Resume {
        /// VPS hostname
        hostname: String,
    },

    /// Remove the container and mark the VPS deleted
    Delete {
        /// VPS hostname
        hostname: String,
    },

    /// Show live resource usage
    Usage {
        /// VPS hostname
        hostname: String,
    },

    /// Bootstrap a new remote-shell session
    Ssh {
        /// VPS hostname
        hostname: String,
    },

    /// Back up a VPS (stops it for the duration)
    Backup {
        /// VPS hostname
        hostname: String,
    },

    /// Restore a VPS from a recorded snapshot
    Restore {
        /// VPS hostname
        hostname: String,

        /// Snapshot ID
        snapshot_id: String,
    },

    /// Aggregate fleet counts
    Summary,

    /// Back up every running VPS
    BackupAll,

    /// Stop every running VPS of an owner
    StopAll {
        /// Owner user ID
        owner: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turn a not-found result into an error.
fn found<T>(hostname: &str, value: Option<T>) -> anyhow::Result<T> {
    value.ok_or_else(|| OrchestratorError::InstanceNotFound(hostname.to_string()).into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries JSON results
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("hearth=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = HearthConfig::from_env();
    tracing::debug!(?config, "Configuration loaded");
    config.validate_warn();

    let planes = PlaneCatalog::load(&config.planes_path)
        .with_context(|| format!("loading planes from {}", config.planes_path.display()))?;

    let orchestrator_config = config.orchestrator_config()?;
    let runtime = DockerRuntime::connect()
        .context("connecting to Docker")?
        .with_stop_timeout(config.stop_timeout);
    let orchestrator = VpsOrchestrator::open(Arc::new(runtime), planes, orchestrator_config).await?;

    match cli.command {
        Commands::Planes => print_json(&orchestrator.planes())?,
        Commands::Provision {
            owner,
            username,
            plane,
        } => print_json(&orchestrator.provision(&owner, &username, &plane).await?)?,
        Commands::List { owner } => {
            let instances = match owner {
                Some(owner) => orchestrator.instances_for_owner(&owner).await,
                None => orchestrator.list().await,
            };
            print_json(&instances)?
        }
        Commands::Show { hostname } => {
            print_json(&found(&hostname, orchestrator.get(&hostname).await)?)?
        }
        Commands::Start { hostname } => {
            print_json(&found(&hostname, orchestrator.start(&hostname).await?)?)?
        }
        Commands::Stop { hostname } => {
            print_json(&found(&hostname, orchestrator.stop(&hostname).await?)?)?
        }
        Commands::Restart { hostname } => {
            print_json(&found(&hostname, orchestrator.restart(&hostname).await?)?)?
        }
        Commands::Suspend { hostname } => {
            print_json(&found(&hostname, orchestrator.suspend(&hostname).await?)?)?
        }
        Commands::Resume { hostname } => {
            print_json(&found(&hostname, orchestrator.resume(&hostname).await?)?)?
        }
        Commands::Delete { hostname } => {
            print_json(&found(&hostname, orchestrator.delete(&hostname).await?)?)?
        }
        Commands::Usage { hostname } => {
            print_json(&found(&hostname, orchestrator.usage(&hostname).await?)?)?
        }
        Commands::Ssh { hostname } => {
            let vps = found(&hostname, orchestrator.refresh_session(&hostname).await?)?;
            print_json(&vps.session)?
        }
        Commands::Backup { hostname } => {
            tracing::info!(hostname = %hostname, "Instance is unavailable until the backup finishes");
            print_json(&found(&hostname, orchestrator.backup(&hostname).await?)?)?
        }
        Commands::Restore {
            hostname,
            snapshot_id,
        } => print_json(&found(
            &hostname,
            orchestrator.restore_backup(&hostname, &snapshot_id).await?,
        )?)?,
        Commands::Summary => print_json(&orchestrator.fleet_summary().await)?,
        Commands::BackupAll => print_json(&orchestrator.force_backup_all().await)?,
        Commands::StopAll { owner } => print_json(&orchestrator.stop_all_for_owner(&owner).await)?,
    }

    Ok(())
}
