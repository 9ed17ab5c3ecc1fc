use axum::{
    extract::{DefaultBodyLimit, Request},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

use crate::state::AppState;

pub mod admin;
pub mod demand;
pub mod export;
pub mod ingest;
pub mod readings;

pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.settings.max_body_bytes;

    Router::new()
        .route("/api/data", post(ingest::ingest).get(readings::overview))
        .route("/api/latest", get(readings::latest))
        .route("/api/history", get(readings::history))
        .route("/api/historico", get(readings::history))
        .route("/api/estatisticas", get(readings::statistics))
        .route("/api/demanda-diaria", get(demand::hourly))
        .route("/api/demanda-mensal", get(demand::daily))
        .route("/api/demanda-tempo-real", get(demand::realtime))
        .route("/api/exportar/csv/completo", get(export::full))
        .route("/api/exportar/csv/resumido", get(export::summary))
        .route("/api/exportar/csv/periodo", get(export::period))
        .route("/api/clear", post(admin::clear))
        .route("/api/health", get(admin::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}
