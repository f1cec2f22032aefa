//! Durable backends driven through the full HTTP stack.

mod common;

use axum::http::StatusCode;
use common::{body_text, get, send};
use std::sync::Arc;
use vitals_server::app;
use vitals_server::service::MetricsService;
use vitals_server::state::AppState;
use vitals_storage::file::FileStorage;
use vitals_storage::sql::SqlStorage;
use vitals_storage::MetricStorage;

fn state_with(storage: Arc<dyn MetricStorage>) -> AppState {
    AppState {
        service: MetricsService::new(storage),
        sign_key: None,
        private_key: None,
        trusted_subnet: None,
        audit: Arc::default(),
    }
}

#[tokio::test]
async fn file_backend_survives_a_restart_behind_the_router() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    {
        // Synchronous mode: every accepted update is already durable.
        let storage = Arc::new(FileStorage::new(&path, true, false));
        let app = app::build_router(state_with(storage));

        send(&app, "POST", "/update/counter/hits/5", &[], Vec::new()).await;
        send(&app, "POST", "/update/counter/hits/7", &[], Vec::new()).await;
        send(&app, "POST", "/update/gauge/temp/21.5", &[], Vec::new()).await;
    }

    let restored = Arc::new(FileStorage::new(&path, true, true));
    let app = app::build_router(state_with(restored));

    let (status, body) = get(&app, "/value/counter/hits").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body_text(&body), "12");
    let (_, body) = get(&app, "/value/gauge/temp").await;
    assert_eq!(body_text(&body), "21.5");
}

#[tokio::test]
async fn file_backend_interval_mode_persists_on_explicit_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let storage = Arc::new(FileStorage::new(&path, false, false));
    let app = app::build_router(state_with(storage.clone()));

    send(&app, "POST", "/update/counter/hits/3", &[], Vec::new()).await;
    assert!(!path.exists());

    storage.flush().await.unwrap();
    let restored = Arc::new(FileStorage::new(&path, false, true));
    assert_eq!(restored.counters().await.unwrap().get("hits"), Some(&3));
}

#[tokio::test]
async fn sql_backend_accumulates_behind_the_router() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = dir.path().join("metrics.db");
    let storage = Arc::new(SqlStorage::new(dsn.to_str().unwrap()).unwrap());
    let app = app::build_router(state_with(storage));

    send(&app, "POST", "/update/counter/hits/5", &[], Vec::new()).await;
    send(&app, "POST", "/update/counter/hits/7", &[], Vec::new()).await;
    let batch = r#"[{"id":"temp","type":"gauge","value":36.6},{"id":"hits","type":"counter","delta":8}]"#;
    let (status, _, _) = send(
        &app,
        "POST",
        "/updates",
        &[("Content-Type", "application/json")],
        batch.as_bytes().to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&app, "/value/counter/hits").await;
    assert_eq!(body_text(&body), "20");
    let (_, body) = get(&app, "/value/gauge/temp").await;
    assert_eq!(body_text(&body), "36.6");

    let (status, _) = get(&app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sql_backend_rejected_batch_is_not_observable() {
    let dir = tempfile::tempdir().unwrap();
    let storage =
        Arc::new(SqlStorage::new(dir.path().join("metrics.db").to_str().unwrap()).unwrap());
    let app = app::build_router(state_with(storage));

    let batch = r#"[{"id":"a","type":"gauge","value":1},{"id":"b","type":"counter"}]"#;
    let (status, _, _) = send(
        &app,
        "POST",
        "/updates",
        &[("Content-Type", "application/json")],
        batch.as_bytes().to_vec(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/value/gauge/a").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
