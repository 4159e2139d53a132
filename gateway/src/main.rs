//! Aurora gateway server.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aurora_gateway::config::Config;
use aurora_gateway::logs::LogBuffer;
use aurora_gateway::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("aurora-gateway {}", VERSION);
        return Ok(());
    }

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Check config.toml, the settings file and AURORA__* environment variables.",
            e
        )
    })?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    std::fs::create_dir_all(&config.storage_dir)
        .map_err(|e| format!("Failed to create storage dir {}: {}", config.storage_dir, e))?;

    tracing::info!(
        "Starting aurora-gateway {}: llama-server at {}, default model {}",
        VERSION,
        config.engine_config().base_url(),
        config.default_model
    );

    let addr = format!("{}:{}", config.host, config.port);
    let logs = Arc::new(LogBuffer::default());
    let state = Arc::new(AppState::new(config, logs));
    let app = aurora_gateway::app(state.clone());

    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, stopping llama-server");
    state.supervisor().await.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
