use anyhow::Result;
use meter_service::{
    api,
    config::AppConfig,
    metrics_server, observability,
    state::{open_store, AppState, Settings},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let settings = Settings::from_config(&cfg)?;
    let store = open_store(&cfg.store).await?;
    let app = api::router(AppState::new(store, settings));

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "meter service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("meter service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
