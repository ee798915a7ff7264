use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aw_domain::config::{Config, ConfigSeverity};
use aw_gateway::api;
use aw_gateway::cli::{load_config, Cli, Command, ConfigCommand};
use aw_gateway::runtime::coordinator::SessionCoordinator;
use aw_gateway::runtime::source::{AgentSource, EchoSource};
use aw_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = load_config(&cli.config)?;
            if !aw_gateway::cli::validate(&config, &cli.config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = load_config(&cli.config)?;
            aw_gateway::cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("agentwire {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,aw_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("AgentWire starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Runtime wiring ───────────────────────────────────────────────
    let coordinator = SessionCoordinator::new(&config);
    let sweeper = coordinator.spawn_sweeper(config.buffer.cleanup_interval());

    let source: Arc<dyn AgentSource> = Arc::new(EchoSource);
    let state = AppState::new(config.clone(), coordinator.clone(), source);
    if state.api_token_hash.is_none() {
        tracing::warn!(
            env = %config.server.api_token_env,
            "no API token configured — open access (dev mode)"
        );
    }

    let app = api::router(state.clone()).with_state(state);

    // ── Serve ────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "agentwire listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(coordinator.clone()))
        .await
        .context("server error")?;

    sweeper.abort();
    tracing::info!("agentwire stopped");
    Ok(())
}

async fn shutdown_signal(coordinator: Arc<SessionCoordinator>) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received — draining");
    coordinator.shutdown();
}
