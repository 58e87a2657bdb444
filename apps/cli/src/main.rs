//! edgerelay CLI
//!
//! Runs the WebSocket-to-TCP relay server and manages its configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edgerelay_core::AuthToken;
use edgerelay_server::{drain, Server};
use edgerelay_settings::{default_settings_path, Settings};

/// edgerelay - WebSocket to TCP relay
#[derive(Parser)]
#[command(name = "edgerelay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.edgerelay/settings.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Run(RunArgs),

    /// Print a freshly generated auth token
    Token,

    /// Print the effective configuration as JSON
    Config {
        /// Also write it to the settings file
        #[arg(long)]
        write: bool,
    },
}

/// Flags that override the settings file and environment
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Auth token clients must present (8-4-4-4-12 hex)
    #[arg(short, long)]
    token: Option<String>,

    /// Path that accepts WebSocket upgrades
    #[arg(long)]
    path: Option<String>,

    /// Idle timeout in seconds
    #[arg(long)]
    idle_timeout: Option<u64>,
}

impl RunArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(listen) = self.listen {
            settings.server.listen_addr = listen;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(token) = self.token {
            settings.relay.auth_token = Some(token);
        }
        if let Some(path) = self.path {
            settings.server.ws_path = path;
        }
        if let Some(idle) = self.idle_timeout {
            settings.relay.idle_timeout_secs = idle;
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// File, then `EDGERELAY_*` environment
fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = path.unwrap_or_else(default_settings_path);
    let mut settings = Settings::load_from(&path).with_context(|| format!("Failed to load {:?}", path))?;
    settings.apply_env().context("Invalid environment override")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            let mut settings = load_settings(cli.config)?;
            args.apply(&mut settings);
            run(settings).await?;
        }
        Commands::Token => {
            println!("{}", AuthToken::generate());
        }
        Commands::Config { write } => {
            let settings = load_settings(cli.config)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if write {
                settings.save().context("Failed to write settings")?;
            }
        }
    }

    Ok(())
}

async fn run(settings: Settings) -> Result<()> {
    let server = Server::bind(&settings).await.context("Failed to start server")?;
    let relay = server.relay();
    let grace = settings.shutdown_grace();

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        wait_for_signal().await;
        let _ = signalled_tx.send(());
    };

    // Starts counting only once a signal has arrived
    let forced = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    let graceful = async {
        server.run(shutdown).await?;
        info!("Waiting up to {:?} for {} sessions", grace, relay.active_sessions());
        drain(&relay, grace).await;
        Ok::<_, anyhow::Error>(())
    };

    tokio::select! {
        result = graceful => result?,
        _ = forced => {
            warn!("Shutdown did not finish within {:?}, closing remaining sessions", grace);
        }
    }

    info!("edgerelay stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
