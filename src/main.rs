//! Intune Assignment Checker - HTTP service
//!
//! Serves the policy inventory, per-subject assignment views and
//! multi-subject comparisons over a JSON API.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;

use intune_assignment_checker::{
    api,
    logging::{init_logging, ConsoleStream},
    services::GraphClient,
    AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Intune Assignment Checker {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Configuration first, so logging knows its format
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Held until exit so buffered file logs are flushed
    let _log_guard = init_logging(&config.logging, ConsoleStream::Stdout);

    info!("Intune Assignment Checker starting up");

    let graph = GraphClient::from_config(&config).context("Failed to initialize Graph client")?;
    let state = AppState::with_graph(config.clone(), graph);
    let app = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn print_help() {
    println!(
        r#"Intune Assignment Checker {}

USAGE:
    intune-assignment-checker [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information

ENVIRONMENT:
    INTUNE_CHECKER_CONFIG   Path to configuration file (default: config.yaml)
    AZURE_TENANT_ID         Directory tenant used for client credentials
    AZURE_CLIENT_ID         Application (client) id
    AZURE_CLIENT_SECRET     Client secret
    GRAPH_ACCESS_TOKEN      Pre-acquired bearer token; overrides client credentials

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by INTUNE_CHECKER_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/intune-assignment-checker/config.yaml
    5. <user config dir>/intune-assignment-checker/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
