use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunkrender_core::{
    load_config, validate_config, Config, FfmpegMuxer, FsObjectStore, HttpRenderWorker,
    InMemoryObjectStore, MediaMuxer, ObjectStore, RenderOrchestrator, RenderWorker,
    StorageBackend,
};

use chunkrender_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let json_logs = std::env::var("CHUNKRENDER_LOG_FORMAT").is_ok_and(|f| f == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Determine config path
    let config_path = std::env::var("CHUNKRENDER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );

    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let state = Arc::new(AppState::new(config.clone(), orchestrator));

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down, cancelling running renders...");
    state.shutdown();

    Ok(())
}

/// Wires storage, worker transport and muxer into an orchestrator.
async fn build_orchestrator(config: &Config) -> Result<RenderOrchestrator> {
    let store: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; render outputs are lost on restart");
            Arc::new(InMemoryObjectStore::new())
        }
        StorageBackend::Filesystem => {
            info!("Using filesystem storage at {:?}", config.storage.root);
            Arc::new(FsObjectStore::new(config.storage.root.clone()))
        }
    };

    info!("Render workers at {}", config.worker.endpoint);
    let worker: Arc<dyn RenderWorker> = Arc::new(
        HttpRenderWorker::new(config.worker.clone()).context("Failed to create worker client")?,
    );

    let muxer = FfmpegMuxer::new(config.combiner.clone());
    if let Err(e) = muxer.validate().await {
        // Renders still run; only combining fails until ffmpeg is available.
        warn!("Muxer validation failed: {}", e);
    }
    let muxer: Arc<dyn MediaMuxer> = Arc::new(muxer);

    Ok(RenderOrchestrator::new(config.render_settings(), worker, muxer, store).with_version(VERSION))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
