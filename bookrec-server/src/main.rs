use anyhow::Context;
use bookrec_server::config::ServerConfig;
use bookrec_server::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("bookrec_server=info".parse()?)
                .add_directive("bookrec_core=info".parse()?),
        )
        .init();

    info!("Initializing bookrec server...");

    let config = ServerConfig::from_env().context("invalid BOOKREC_* configuration")?;
    info!(data_path = ?config.data_path, bind = %config.bind_addr, backend = ?config.index.backend, "Configuration loaded");

    let embedder = config.embedder.build().context("failed to construct embedder")?;
    info!(model_id = embedder.model_id(), "Embedder ready");

    let bind_addr = config.bind_addr;
    let app_state = AppState::new(config, embedder);
    app_state.load_on_startup().await;

    let app = bookrec_server::router(app_state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Starting server on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal(app_state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>(); // On non-Unix, just wait for Ctrl+C

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }

    if app_state.is_rebuilding() {
        warn!("Shutting down during an index rebuild; the next rebuild resumes from the last checkpoint");
    }
    info!("Shutting down.");
}
