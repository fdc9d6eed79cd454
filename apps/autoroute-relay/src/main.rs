use anyhow::{Context, Result};
use autoroute_relay::{router, AppState, Cli, RelayConfig, SeqpacketBackend};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = telemetry::Telemetry::init()?;

    let cli = Cli::parse();
    let config = RelayConfig::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        socket_path = %config.socket_path.display(),
        send_timeout_secs = config.send_timeout.as_secs(),
        recv_timeout_secs = config.recv_timeout.as_secs(),
        "starting autoroute relay"
    );

    let backend = SeqpacketBackend::new(
        config.socket_path.clone(),
        config.send_timeout,
        config.recv_timeout,
    );
    let state = Arc::new(AppState::new(Arc::new(backend), telemetry.metrics_handle()));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("autoroute relay listening on {}", config.listen_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!("autoroute relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
