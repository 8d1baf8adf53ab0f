use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use lagoon_relay::config::FileConfig;
use lagoon_relay::{AppState, build_router};

#[derive(Parser)]
#[command(name = "lagoon")]
#[command(about = "Real-time relay for the Lagoon live-chat platform")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a config file (defaults to ./lagoon.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server in the foreground
    Serve(ServeArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Port for the server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Bare `lagoon`: serve with defaults.
        None => run_server(ServeArgs::default(), cli.config).await,
        Some(Commands::Serve(args)) => run_server(args, cli.config).await,
    }
}

async fn run_server(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "lagoon=debug,tower_http=debug,info"
    } else {
        "lagoon=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Lagoon relay");

    let mut config = FileConfig::load(config_path.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let addr = config.bind_addr()?;
    let state = AppState::new(config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Relay listening on http://{}", listener.local_addr()?);
    info!("  GET /api/ws      - relay WebSocket");
    info!("  GET /api/health  - health check");
    info!("  GET /api/metrics - relay metrics");

    axum::serve(listener, app)
        .await
        .context("server exited with an error")
}
