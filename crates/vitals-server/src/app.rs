use crate::state::AppState;
use crate::{handlers, logging, middleware as mw};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;

/// Assembles the route table and the ordered middleware stack.
///
/// Layers added later wrap the ones before them, so the list below reads
/// innermost-first: audit sits next to the handlers and the access log is
/// outermost. Trailing-slash normalization has to wrap the router itself and
/// is applied by the caller (`main`, and the tests that exercise it).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/update", post(handlers::update_json))
        .route("/update/:kind/:name/:value", post(handlers::update_path))
        .route("/updates", post(handlers::update_batch))
        .route("/value", post(handlers::value_json))
        .route("/value/:kind/:name", get(handlers::value_path))
        .route("/", get(handlers::list_html))
        .route("/ping", get(handlers::ping))
        .layer(middleware::from_fn_with_state(state.clone(), mw::audit))
        .layer(middleware::from_fn(mw::gzip_request))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::hash_validation,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), mw::decrypt))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::trusted_subnet_gate,
        ))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(logging::access_log))
        .with_state(state)
}
