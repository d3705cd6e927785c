use crate::api::{self, AppState};
use crate::config::types::AppConfig;
use crate::security::clock::SystemClock;
use crate::security::janitor::Janitor;
use crate::session::directory::StaticDirectory;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the gateway until Ctrl-C or SIGTERM.
pub async fn run(config: AppConfig) -> Result<()> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(addr = %config.server.listen, "Gateway listening");

    serve(listener, config, shutdown).await
}

/// Serve on a pre-bound listener until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    config: AppConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    if config.accounts.is_empty() {
        warn!("No accounts configured; every protected request will get 404");
    }
    let directory = Arc::new(StaticDirectory::from_config(&config.accounts));
    let state = AppState::from_config(&config, directory, Arc::new(SystemClock));

    let janitor = Janitor::for_firewall(&state.firewall, config.firewall.sweep_interval())
        .with_route_limits(state.route_limits.clone())
        .with_metrics(state.metrics.clone())
        .spawn(shutdown.clone());

    let app = api::build_router(state);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let mut drained = tokio::spawn(async move { server.await });

    let exited_early = tokio::select! {
        res = &mut drained => Some(res),
        _ = shutdown.cancelled() => None,
    };
    if let Some(res) = exited_early {
        shutdown.cancel();
        let _ = janitor.await;
        return match res {
            Ok(inner) => inner.context("gateway server failed"),
            Err(e) => Err(anyhow::anyhow!("gateway server task failed: {e}")),
        };
    }

    // Server stops accepting on cancel; give in-flight requests the timeout
    info!(timeout = shutdown_timeout.as_secs(), "Initiating graceful shutdown");
    match tokio::time::timeout(shutdown_timeout, drained).await {
        Ok(Ok(Ok(()))) => info!("Graceful shutdown complete"),
        Ok(Ok(Err(e))) => error!(error = %e, "Server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "Server task failed"),
        Err(_) => warn!("Shutdown timeout reached, forcing exit"),
    }

    if let Err(e) = janitor.await {
        warn!(error = %e, "Janitor task ended abnormally");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, initiating graceful shutdown"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received, initiating graceful shutdown");
}
