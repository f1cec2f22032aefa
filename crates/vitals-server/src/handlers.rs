//! The HTTP request handlers.

use crate::middleware::AuditContext;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::time::Duration;
use vitals_common::hash;
use vitals_common::metric::{Metric, MetricKind, MetricValue};

/// POST `/update/{kind}/{name}/{value}`: single update via path segments.
pub async fn update_path(
    State(state): State<AppState>,
    Extension(audit): Extension<AuditContext>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return (StatusCode::BAD_REQUEST, "Invalid metric type").into_response();
    };
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Metric name is required").into_response();
    }

    let value = match kind {
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(d) => MetricValue::Counter(d),
            Err(_) => return (StatusCode::BAD_REQUEST, "Invalid counter value").into_response(),
        },
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(v) => MetricValue::Gauge(v),
            Err(_) => return (StatusCode::BAD_REQUEST, "Invalid gauge value").into_response(),
        },
    };

    if let Err(e) = state.service.apply(kind, &name, value).await {
        return (e.status(), e.to_string()).into_response();
    }
    audit.add(name);
    StatusCode::OK.into_response()
}

/// POST `/update`: single update as a JSON record; echoes the stored value.
///
/// The echo re-reads the store, so a counter reports the accumulated total
/// rather than the delta just applied.
pub async fn update_json(
    State(state): State<AppState>,
    Extension(audit): Extension<AuditContext>,
    body: Bytes,
) -> Response {
    let Ok(mut metric) = serde_json::from_slice::<Metric>(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };

    let payload = match metric.payload() {
        Ok(payload) => payload,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    if let Err(e) = state.service.apply(metric.kind, &metric.id, payload).await {
        return (e.status(), e.to_string()).into_response();
    }

    if let Ok(current) = state.service.value(metric.kind, &metric.id).await {
        metric.set_payload(current);
    }
    audit.add(metric.id.clone());

    signed_json(&state, StatusCode::OK, &metric)
}

/// POST `/updates`: batch update. Every record is validated before any
/// write; one bad record rejects the whole batch with 400.
pub async fn update_batch(
    State(state): State<AppState>,
    Extension(audit): Extension<AuditContext>,
    body: Bytes,
) -> Response {
    let Ok(metrics) = serde_json::from_slice::<Vec<Metric>>(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };

    if let Err(e) = state.service.update_batch(&metrics).await {
        return (e.status(), e.to_string()).into_response();
    }
    for metric in &metrics {
        audit.add(metric.id.clone());
    }
    StatusCode::OK.into_response()
}

/// POST `/value`: single query as a JSON record.
pub async fn value_json(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(mut metric) = serde_json::from_slice::<Metric>(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
    };
    if metric.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid metric data").into_response();
    }

    match state.service.value(metric.kind, &metric.id).await {
        Ok(current) => {
            metric.set_payload(current);
            signed_json(&state, StatusCode::OK, &metric)
        }
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// GET `/value/{kind}/{name}`: single query, plain-text value.
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return (StatusCode::NOT_FOUND, "invalid metric type").into_response();
    };
    match state.service.value(kind, &name).await {
        Ok(value) => value.to_string().into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// GET `/`: HTML listing of both mappings, names sorted for stable output.
pub async fn list_html(State(state): State<AppState>) -> Response {
    let (gauges, counters) = match (state.service.gauges().await, state.service.counters().await) {
        (Ok(g), Ok(c)) => (g, c),
        (Err(e), _) | (_, Err(e)) => return (e.status(), e.to_string()).into_response(),
    };

    let mut rows = String::new();
    let mut gauge_names: Vec<_> = gauges.keys().collect();
    gauge_names.sort();
    for name in gauge_names {
        rows.push_str(&format!("\t\t\t{}: {}<br/>\n", name, gauges[name]));
    }
    let mut counter_names: Vec<_> = counters.keys().collect();
    counter_names.sort();
    for name in counter_names {
        rows.push_str(&format!("\t\t\t{}: {}<br/>\n", name, counters[name]));
    }

    let page = format!(
        "<html>\n\t<head>\n\t\t<title>Metrics</title>\n\t</head>\n\t<body>\n\t\t<div>\n{rows}\t\t</div>\n\t</body>\n</html>\n"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(page))
        .unwrap()
}

/// GET `/ping`: backend connectivity probe with a 1 s deadline.
pub async fn ping(State(state): State<AppState>) -> Response {
    match tokio::time::timeout(Duration::from_secs(1), state.service.ping()).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(_) => {
            tracing::warn!("Ping timed out");
            (StatusCode::INTERNAL_SERVER_ERROR, "backend timeout").into_response()
        }
    }
}

/// Serializes a metric response, attaching `HashSHA256` when signing is
/// configured.
fn signed_json(state: &AppState, status: StatusCode, metric: &Metric) -> Response {
    let data = match serde_json::to_vec(metric) {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to marshal response: {e}"),
            )
                .into_response()
        }
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = &state.sign_key {
        builder = builder.header("HashSHA256", hash::compute_hash(&data, key));
    }
    builder.body(Body::from(data)).unwrap()
}
