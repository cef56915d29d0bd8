//! Axum API server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};

use vedit_api::{create_router, metrics, ApiConfig, AppState, Backend};
use vedit_media::check_ffmpeg;
use vedit_worker::{telemetry, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::install_crypto_provider();
    telemetry::init_tracing();

    info!("Starting vedit-api");

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, backend={:?}, embedded_workers={}",
        config.host, config.port, config.backend, config.embedded_workers
    );

    if config.is_production() && config.backend == Backend::Memory {
        warn!("In-memory backend in production: records and jobs are lost on restart");
    }

    if let Err(e) = check_ffmpeg() {
        // Uploads and reads still work; edits will fail until ffmpeg is installed
        warn!("FFmpeg unavailable: {}", e);
    }

    let state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let workers = if config.embedded_workers {
        let mut worker_config = WorkerConfig::from_env();
        // The API serves /metrics itself
        worker_config.metrics_port = None;
        match state.workers(worker_config) {
            Ok(workers) => {
                info!("Running render and notification workers in-process");
                let handles = workers.spawn();
                Some((workers, handles))
            }
            Err(e) => {
                error!("Failed to start embedded workers: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("Server error: {}", e);
    }

    if let Some((workers, handles)) = workers {
        workers.shutdown();
        for handle in handles {
            handle.await.ok();
        }
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
