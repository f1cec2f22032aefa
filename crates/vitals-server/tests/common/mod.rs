#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use rsa::RsaPrivateKey;
use std::sync::Arc;
use tower::util::ServiceExt;
use vitals_audit::Subject;
use vitals_server::app;
use vitals_server::service::MetricsService;
use vitals_server::state::AppState;
use vitals_storage::memory::MemStorage;
use vitals_storage::MetricStorage;

pub struct TestContext {
    pub storage: Arc<MemStorage>,
    pub state: AppState,
    pub app: Router,
}

#[derive(Default)]
pub struct StateOptions {
    pub key: Option<String>,
    pub trusted_subnet: Option<String>,
    pub private_key: Option<Arc<RsaPrivateKey>>,
    pub audit: Option<Arc<Subject>>,
}

pub fn build_context(options: StateOptions) -> TestContext {
    let storage = Arc::new(MemStorage::new());
    let dyn_storage: Arc<dyn MetricStorage> = storage.clone();
    let state = AppState {
        service: MetricsService::new(dyn_storage),
        sign_key: options.key,
        private_key: options.private_key,
        trusted_subnet: options
            .trusted_subnet
            .map(|s| s.parse().expect("test subnet should parse")),
        audit: options.audit.unwrap_or_default(),
    };
    let app = app::build_router(state.clone());
    TestContext {
        storage,
        state,
        app,
    }
}

pub fn plain_context() -> TestContext {
    build_context(StateOptions::default())
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(Body::from(body)).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    (status, headers, bytes.to_vec())
}

pub async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    send(
        app,
        "POST",
        uri,
        &[("Content-Type", "application/json")],
        body.as_bytes().to_vec(),
    )
    .await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let (status, _, body) = send(app, "GET", uri, &[], Vec::new()).await;
    (status, body)
}

pub fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).to_string()
}
