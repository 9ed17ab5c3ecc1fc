use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    Json,
};
use meter_core::domain::{Reading, ReadingPayload};
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub total_registros: usize,
    pub received: Value,
}

/// `POST /api/data`: stamps the device body with the server clock and the
/// peer address, then stores it.
pub async fn ingest(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<IngestResponse>, ApiError> {
    let received = Value::Object(body.clone());
    let payload = ReadingPayload::from_json(body);
    let reading = Reading::received(
        payload,
        Some(peer.ip().to_canonical().to_string()),
        OffsetDateTime::now_utc(),
    );

    let inserted = match state.store.insert(reading).await {
        Ok(inserted) => inserted,
        Err(e) => {
            metrics::counter!("readings_persist_failed_total").increment(1);
            return Err(ApiError::Store {
                context: "failed to persist reading",
                source: e,
            });
        }
    };
    metrics::counter!("readings_ingested_total").increment(1);

    tracing::info!(
        device_id = inserted.reading.device_id.as_deref().unwrap_or("-"),
        demand_w = inserted.reading.demand(),
        total = inserted.total,
        "reading stored"
    );

    Ok(Json(IngestResponse {
        status: "success",
        message: "reading received and stored",
        total_registros: inserted.total,
        received,
    }))
}
