//! setgridd — the SetGrid daemon.
//!
//! Single binary that assembles the SetGrid subsystems:
//! - State store (redb)
//! - Status counter maintainer
//! - Rollout engine
//! - REST API
//!
//! # Usage
//!
//! ```text
//! setgridd standalone --config /etc/setgrid/setgrid.toml --port 8480
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use setgrid_core::SetgridConfig;
use setgrid_rollout::{RolloutEngine, StatusMaintainer};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "setgridd", about = "SetGrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and background workers in one process.
    Standalone(StandaloneArgs),
}

#[derive(clap::Args, Debug, Default)]
struct StandaloneArgs {
    /// Path to setgrid.toml. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on. Overrides `server.port`.
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for persistent state. Overrides `server.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Standalone(args) => {
            init_tracing(args.log_json);
            let config = load_config(&args)?;
            run_standalone(config).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,setgridd=debug,setgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Read the config file, if any, then apply CLI overrides.
fn load_config(args: &StandaloneArgs) -> anyhow::Result<SetgridConfig> {
    let mut config = match &args.config {
        Some(path) => SetgridConfig::from_file(path)?,
        None => SetgridConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = &args.data_dir {
        config.server.data_dir = data_dir.clone();
    }
    Ok(config)
}

async fn run_standalone(config: SetgridConfig) -> anyhow::Result<()> {
    info!("SetGrid daemon starting in standalone mode");

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("setgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = setgrid_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let maintainer = StatusMaintainer::spawn(store.clone(), &config.status);

    let engine = RolloutEngine::new(store, config.settings.clone(), maintainer.handle());
    info!(
        channels = ?config.settings.channels,
        clients = ?config.settings.clients,
        "rollout engine initialized"
    );

    // ── Start API server ───────────────────────────────────────

    let timeout = Duration::from_millis(config.server.request_timeout_ms);
    let router = setgrid_api::build_router(engine, timeout);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, timeout_ms = config.server.request_timeout_ms, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    // Flush queued counter updates before exit.
    maintainer.shutdown().await;

    info!("SetGrid daemon stopped");
    Ok(())
}
