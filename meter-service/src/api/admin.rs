use axum::{extract::State, Json};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// `POST /api/clear`: drops every stored reading.
pub async fn clear(State(state): State<AppState>) -> Result<Json<ClearResponse>, ApiError> {
    state
        .store
        .clear()
        .await
        .map_err(ApiError::store("failed to clear readings"))?;
    metrics::counter!("store_clears_total").increment(1);
    tracing::warn!(backend = state.store.backend(), "reading store cleared");

    Ok(Json(ClearResponse {
        status: "success",
        message: "all readings removed",
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub server: &'static str,
    pub database: &'static str,
    pub total_registros: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let total = state
        .store
        .count()
        .await
        .map_err(ApiError::store("failed to count readings"))?;

    Ok(Json(HealthResponse {
        status: "healthy",
        server: env!("CARGO_PKG_NAME"),
        database: state.store.backend(),
        total_registros: total,
        timestamp: OffsetDateTime::now_utc(),
    }))
}
