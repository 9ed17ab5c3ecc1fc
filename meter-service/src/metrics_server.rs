use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder and serves `/metrics` on `bind_addr`
/// from a background task.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics.bind_addr '{bind_addr}': {e}"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {e}"))?;
    describe();

    // Only the first call installs a recorder; later handles are dropped.
    let _ = PROM_HANDLE.set(handle);

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics listener started");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

fn describe() {
    metrics::describe_counter!("readings_ingested_total", "Readings accepted by POST /api/data");
    metrics::describe_counter!(
        "readings_persist_failed_total",
        "Readings whose store insert returned an error"
    );
    metrics::describe_counter!("demand_queries_total", "Demand chart queries by view");
    metrics::describe_counter!("csv_exports_total", "CSV downloads by kind");
    metrics::describe_counter!("store_clears_total", "Administrative resets");
    metrics::describe_counter!("import_imported_total", "Readings written by import_legacy");
    metrics::describe_counter!("import_rejected_total", "Readings skipped by import_legacy");
    metrics::describe_counter!("import_invalid_total", "Imported readings failing validation");
}

async fn metrics_handler() -> String {
    PROM_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
