//! brokeropd: the brokerop daemon.
//!
//! Keeps the status of every broker cluster instance in the local state
//! cache up to date:
//! - State store (redb)
//! - Administrative API client per instance
//! - Status reconciler, one pass per instance per interval
//!
//! # Usage
//!
//! ```text
//! brokeropd run --config /etc/brokerop/brokerop.toml
//! brokeropd status default/broker --data-dir /var/lib/brokerop
//! ```

mod controller;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use brokerop_core::OperatorConfig;
use brokerop_state::StateStore;

use crate::controller::Controller;

const DB_FILE: &str = "brokerop.redb";

#[derive(Parser)]
#[command(name = "brokeropd", about = "brokerop status daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile instance status periodically until interrupted.
    Run {
        /// Path to brokerop.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for the state store (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Run a single sweep and exit.
        #[arg(long)]
        once: bool,
    },
    /// Print the stored status of an instance as JSON.
    Status {
        /// Instance key, `namespace/name`.
        instance: String,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,brokerop=debug,brokeropd=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            once,
        } => {
            let config = load_config(config.as_deref(), data_dir)?;
            run(config, once).await
        }
        Command::Status {
            instance,
            config,
            data_dir,
        } => {
            let config = load_config(config.as_deref(), data_dir)?;
            print_status(&config, &instance)
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<OperatorConfig> {
    let mut config = match path {
        Some(path) => OperatorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => OperatorConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.operator.data_dir = dir;
    }
    Ok(config)
}

fn open_store(config: &OperatorConfig) -> anyhow::Result<StateStore> {
    let data_dir = &config.operator.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run(config: OperatorConfig, once: bool) -> anyhow::Result<()> {
    info!("brokerop daemon starting");

    let store = open_store(&config)?;
    let controller = Controller::new(store, config.api.clone(), config.api_timeout());

    if once {
        let summary = controller.sweep().await?;
        info!(
            reconciled = summary.reconciled,
            failed = summary.failed,
            "single sweep done"
        );
        return Ok(());
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    controller.run(config.reconcile_interval(), shutdown_rx).await;

    info!("brokerop daemon stopped");
    Ok(())
}

fn print_status(config: &OperatorConfig, key: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let instance = store
        .get_instance(key)?
        .with_context(|| format!("instance {key} not found"))?;
    println!("{}", serde_json::to_string_pretty(&instance.status)?);
    Ok(())
}
