use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use conductor::adapters::http::api_router;
use conductor::bootstrap::{build_orchestrator, init_tracing, StartupError};
use conductor::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    config.validate().map_err(conductor::config::ConfigError::from)?;
    init_tracing(&config.server);

    tracing::info!(environment = ?config.server.environment, "starting conductor");
    let orchestrator = Arc::new(build_orchestrator(&config).await?);

    // The HTTP deadline trails the pipeline's own so timeouts surface as 504 bodies.
    let http_timeout = config.server.request_timeout() + Duration::from_secs(5);
    let app = api_router(orchestrator, http_timeout);

    let addr = config.server.socket_addr().map_err(conductor::config::ConfigError::from)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
