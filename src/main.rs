use anyhow::Context;
use tokio::net::TcpListener;

use content_pipeline::api::status_routes;
use content_pipeline::app::App;
use content_pipeline::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("Content Pipeline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Scheduler: {}", enabled(config.components.scheduler));
    eprintln!("   Worker:    {}", enabled(config.components.worker));
    if config.components.api {
        eprintln!("   Status:    http://0.0.0.0:{}/api/status", config.api_port);
    }

    let api_enabled = config.components.api;
    let api_port = config.api_port;

    let mut app = App::build(config)
        .await
        .context("Failed to assemble components")?;
    app.start()?;

    // ── Status API ──────────────────────────────────────────────────────
    let (api_stop_tx, api_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let api_handle = if api_enabled {
        let router = status_routes(app.api_state());
        let listener = TcpListener::bind(("0.0.0.0", api_port))
            .await
            .with_context(|| format!("Failed to bind status API port {api_port}"))?;
        tracing::info!(port = api_port, "Status API started");
        Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = api_stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "Status API server failed");
            }
        }))
    } else {
        None
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping components");

    app.stop();
    let _ = api_stop_tx.send(());
    app.join().await;
    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn enabled(on: bool) -> &'static str {
    if on { "enabled" } else { "disabled" }
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
