use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use meter_core::{
    domain::{Reading, ReadingPayload},
    store::{JsonFileStore, MemoryStore, ReadingStore},
};
use meter_service::{
    api,
    config::AppConfig,
    state::{AppState, Settings},
};
use serde_json::{json, Value};
use time::{macros::datetime, OffsetDateTime};
use tower::ServiceExt;

fn app_with(store: Arc<dyn ReadingStore>) -> Router {
    let settings = Settings::from_config(&AppConfig::default()).unwrap();
    let state = AppState::new(store, settings);
    api::router(state).layer(MockConnectInfo(SocketAddr::from(([192, 168, 1, 40], 51000))))
}

fn app() -> Router {
    app_with(Arc::new(MemoryStore::new(100)))
}

fn stored_at(created_at: OffsetDateTime, demand: f64) -> Reading {
    let mut payload = ReadingPayload::default();
    payload.device_id = Some("multimedidor_ufrj_001".to_string());
    payload.measurements.active_demand = Some(demand);
    Reading::received(payload, None, created_at)
}

fn total_registros(buckets: &Value) -> u64 {
    buckets
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["registros"].as_u64().unwrap())
        .sum()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn sample(demand: f64) -> Value {
    json!({
        "device_id": "multimedidor_ufrj_001",
        "timestamp": "01/05/2024 10:00:00",
        "Tensao_Trifasica": 220.5,
        "Corrente_Trifasica": 12.0,
        "Potencia_Ativa_Trifasica": 2600.0,
        "Demanda_Ativa": demand,
        "rssi": -61
    })
}

#[tokio::test]
async fn ingest_then_read_back() {
    let app = app();

    let (status, body) = post_json(&app, "/api/data", sample(1500.0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["total_registros"], 1);
    assert_eq!(body["received"]["Demanda_Ativa"], 1500.0);

    post_json(&app, "/api/data", sample(1700.0)).await;

    let (_, overview) = get_json(&app, "/api/data").await;
    assert_eq!(overview["status"], "online");
    assert_eq!(overview["total_registros"], 2);
    assert_eq!(overview["dados"][0]["Demanda_Ativa"], 1700.0);

    let (_, latest) = get_json(&app, "/api/latest").await;
    let reading = &latest["dados"];
    assert_eq!(reading["Demanda_Ativa"], 1700.0);
    assert_eq!(reading["client_ip"], "192.168.1.40");
    assert_eq!(reading["rssi"], -61);
    assert!(reading["created_at"].is_string());

    let (_, history) = get_json(&app, "/api/history?limit=1").await;
    assert_eq!(history["limite"], 1);
    assert_eq!(history["total"], 1);

    let (_, history) = get_json(&app, "/api/historico?limit=abc").await;
    assert_eq!(history["limite"], 100);
    assert_eq!(history["total"], 2);
    assert_eq!(history["dados"][1]["Demanda_Ativa"], 1500.0);
}

#[tokio::test]
async fn latest_is_null_on_empty_store() {
    let (status, body) = get_json(&app(), "/api/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dados"], Value::Null);
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let req = Request::post("/api/data")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1,2,3]"))
        .unwrap();
    let (status, _) = send(&app(), req).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn demand_views_reflect_fresh_readings() {
    let app = app();
    post_json(&app, "/api/data", sample(1000.0)).await;
    post_json(&app, "/api/data", sample(2000.0)).await;
    post_json(&app, "/api/data", sample(0.0)).await;

    // The two positive readings may straddle an hour or a local midnight.
    let (_, hourly) = get_json(&app, "/api/demanda-diaria").await;
    assert_eq!(hourly["periodo"], "Últimas 24 horas");
    assert_eq!(hourly["total_horas"], 24);
    assert_eq!(total_registros(&hourly["dados"]), 2);
    let hours = hourly["estatisticas"]["horas_com_dados"].as_u64().unwrap();
    assert!((1..=2).contains(&hours));
    assert_eq!(hourly["estatisticas"]["maxima_geral"], 2000.0);
    assert_eq!(hourly["estatisticas"]["minima_geral"], 1000.0);

    let (_, daily) = get_json(&app, "/api/demanda-mensal").await;
    assert_eq!(daily["periodo"], "Últimos 30 dias");
    assert_eq!(total_registros(&daily["dados"]), 2);
    let days = daily["estatisticas"]["dias_com_dados"].as_u64().unwrap();
    assert!((1..=2).contains(&days));
    assert_eq!(daily["total_dias"], days);

    let (_, realtime) = get_json(&app, "/api/demanda-tempo-real").await;
    assert_eq!(realtime["total_registros"], 2);
    assert_eq!(realtime["estatisticas"]["demanda_atual"], 2000.0);
    assert_eq!(realtime["estatisticas"]["demanda_maxima"], 2000.0);
}

#[tokio::test]
async fn failed_persist_is_500_but_reading_stays_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("dados.json");
    let store = JsonFileStore::open(&path, 100).await.unwrap();
    let app = app_with(Arc::new(store));

    let (status, body) = post_json(&app, "/api/data", sample(1234.0)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "failed to persist reading");
    assert!(body["error_details"].is_string());

    let (status, latest) = get_json(&app, "/api/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["dados"]["Demanda_Ativa"], 1234.0);
}

#[tokio::test]
async fn period_export_covers_inclusive_local_days() {
    let store = Arc::new(MemoryStore::new(100));
    // Local offset is -03:00, so local 2024-05-01 starts at 03:00 UTC.
    store
        .insert_many(vec![
            stored_at(datetime!(2024-05-01 02:59:59 UTC), 10.0),
            stored_at(datetime!(2024-05-01 03:00:00 UTC), 20.0),
            stored_at(datetime!(2024-05-03 02:59:59 UTC), 30.0),
            stored_at(datetime!(2024-05-03 03:00:00 UTC), 40.0),
        ])
        .await
        .unwrap();
    let app = app_with(store);

    let (status, body) = send(
        &app,
        Request::get("/api/exportar/csv/periodo?inicio=2024-05-01&fim=2024-05-02")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let rows: Vec<Vec<&str>> = text
        .split("\r\n")
        .filter(|l| !l.is_empty())
        .skip(1)
        .map(|l| l.split(';').collect())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][19], "20");
    assert_eq!(rows[0][30], "2024-05-01T03:00:00Z");
    assert_eq!(rows[1][19], "30");
    assert_eq!(rows[1][30], "2024-05-03T02:59:59Z");
}

#[tokio::test]
async fn statistics_summarize_store() {
    let app = app();
    post_json(&app, "/api/data", sample(1000.0)).await;

    let (_, body) = get_json(&app, "/api/estatisticas").await;
    let stats = &body["estatisticas"];
    assert_eq!(stats["total_leituras"], 1);
    assert_eq!(stats["tensao_media"], 220.5);
    assert_eq!(stats["potencia_maxima"], 2600.0);
}

#[tokio::test]
async fn clear_empties_the_store() {
    let app = app();
    post_json(&app, "/api/data", sample(1000.0)).await;

    let (status, body) = post_json(&app, "/api/clear", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (_, health) = get_json(&app, "/api/health").await;
    assert_eq!(health["total_registros"], 0);

    let (_, hourly) = get_json(&app, "/api/demanda-diaria").await;
    assert_eq!(hourly["estatisticas"]["horas_com_dados"], 0);
}

#[tokio::test]
async fn exports_are_404_when_empty() {
    let app = app();
    for uri in ["/api/exportar/csv/completo", "/api/exportar/csv/resumido"] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["status"], "error");
    }
}

#[tokio::test]
async fn period_export_validates_dates() {
    let app = app();
    post_json(&app, "/api/data", sample(1000.0)).await;

    let (status, _) = get_json(&app, "/api/exportar/csv/periodo").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        get_json(&app, "/api/exportar/csv/periodo?inicio=2024-13-01&fim=2024-05-02").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        get_json(&app, "/api/exportar/csv/periodo?inicio=2024-05-02&fim=2024-05-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        get_json(&app, "/api/exportar/csv/periodo?inicio=2001-01-01&fim=2001-01-02").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_export_is_a_csv_attachment() {
    let app = app();
    post_json(&app, "/api/data", sample(1000.0)).await;
    post_json(&app, "/api/data", sample(1100.0)).await;

    let res = app
        .clone()
        .oneshot(
            Request::get("/api/exportar/csv/completo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"dados_completos_multimedidor_"));

    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("1;multimedidor_ufrj_001;"));
    assert!(lines[2].contains(";1100;"));
}

#[tokio::test]
async fn health_reports_backend() {
    let (status, body) = get_json(&app(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "memory");
    assert_eq!(body["server"], "meter-service");
}
