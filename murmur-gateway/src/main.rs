use anyhow::Context;
use murmur_gateway::{AppState, config::Config, create_app, spawn_workers};
use murmur_store::Store;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting murmur gateway...");

    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, max_connections={}, production={}, store={}, stream={}",
        config.port,
        config.max_connections,
        config.production,
        config.store_path,
        config.log_stream
    );
    tracing::info!(
        "Timing: heartbeat={}s, broadcast={}ms, log_block={}ms",
        config.heartbeat_interval.as_secs(),
        config.broadcast_interval.as_millis(),
        config.log_block.as_millis()
    );

    let store = Store::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open store at {}", config.store_path))?;

    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState::from_store(config, store);
    let _workers = spawn_workers(&state);
    let app = create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
