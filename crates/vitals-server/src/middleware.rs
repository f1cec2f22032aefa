//! The request-processing layers in front of the handlers.
//!
//! Outermost to innermost: access log (see [`crate::logging`]), slash
//! normalization and response compression (tower-http, wired in `app`/
//! `main`), trusted-subnet gate, decryption, hash validation, gzip
//! inflation, audit. Each layer short-circuits with an HTTP error; a request
//! that reaches the handler has a plaintext, inflated, validated body.

use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use vitals_audit::AuditEvent;
use vitals_common::{crypto, hash};

/// Upper bound on buffered request bodies.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Per-request list of metric ids the handler touched.
///
/// Inserted by [`audit`] as a request extension; handlers record every
/// metric they modify and the middleware fans the result out after the
/// handler completes.
#[derive(Clone, Default)]
pub struct AuditContext(Arc<Mutex<Vec<String>>>);

impl AuditContext {
    pub fn add(&self, id: impl Into<String>) {
        self.0.lock().unwrap().push(id.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Rejects writers outside the configured subnet with 403.
///
/// The caller IP is taken from `X-Real-IP`; a missing or unparseable header
/// is a rejection too. Unconfigured subnet passes everything through.
pub async fn trusted_subnet_gate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(req).await;
    };

    let real_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if real_ip.is_empty() {
        tracing::warn!(path = %req.uri().path(), "X-Real-IP header is required but missing");
        return (StatusCode::FORBIDDEN, "X-Real-IP header is required").into_response();
    }

    let Ok(ip) = real_ip.parse::<IpAddr>() else {
        tracing::warn!(real_ip, "Invalid IP address in X-Real-IP header");
        return (
            StatusCode::FORBIDDEN,
            "Invalid IP address in X-Real-IP header",
        )
            .into_response();
    };

    if !subnet.contains(&ip) {
        tracing::warn!(ip = %ip, subnet = %subnet, "IP address is not in trusted subnet");
        return (StatusCode::FORBIDDEN, "IP address is not in trusted subnet").into_response();
    }

    next.run(req).await
}

/// Replaces an `encrypt`-encoded body with its RSA-OAEP plaintext.
pub async fn decrypt(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(private_key) = state.private_key.clone() else {
        return next.run(req).await;
    };
    if header_str(&req, header::CONTENT_ENCODING.as_str()) != Some("encrypt") {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let Ok(encrypted) = to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
    };

    match crypto::decrypt(&encrypted, &private_key) {
        Ok(plaintext) => {
            parts.headers.remove(header::CONTENT_ENCODING);
            next.run(Request::from_parts(parts, Body::from(plaintext)))
                .await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decrypt request body");
            (StatusCode::BAD_REQUEST, "Failed to decrypt request body").into_response()
        }
    }
}

/// Validates the `HashSHA256` header over the body exactly as sent.
///
/// Runs before gzip inflation: the agent signs the compressed (or encrypted)
/// bytes. Absent or `none` headers pass through; an unconfigured key
/// disables validation entirely.
pub async fn hash_validation(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.sign_key.clone() else {
        return next.run(req).await;
    };

    let received = header_str(&req, "HashSHA256").unwrap_or("").to_string();
    if received.is_empty() || received == "none" {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
    };

    if !hash::validate_hash(&bytes, &key, &received) {
        tracing::warn!("Invalid hash signature");
        return (StatusCode::BAD_REQUEST, "Invalid hash signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Inflates gzip request bodies for JSON and HTML payloads.
pub async fn gzip_request(req: Request, next: Next) -> Response {
    if header_str(&req, header::CONTENT_ENCODING.as_str()) != Some("gzip") {
        return next.run(req).await;
    }

    let content_type = header_str(&req, header::CONTENT_TYPE.as_str()).unwrap_or("");
    if !content_type.starts_with("application/json") && !content_type.starts_with("text/html") {
        return (StatusCode::BAD_REQUEST, "Unsupported content type").into_response();
    }

    let (mut parts, body) = req.into_parts();
    let Ok(compressed) = to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
    };

    let mut inflated = Vec::new();
    if let Err(e) = GzDecoder::new(&compressed[..]).read_to_end(&mut inflated) {
        tracing::warn!(error = %e, "Failed to read gzip body");
        return (StatusCode::BAD_REQUEST, "Failed to read gzip body").into_response();
    }

    parts.headers.remove(header::CONTENT_ENCODING);
    next.run(Request::from_parts(parts, Body::from(inflated)))
        .await
}

/// Installs the per-request [`AuditContext`] and fans out an event after the
/// handler completes.
///
/// Notification runs on a detached task so slow observers never delay the
/// response, and observer failure can never fail the request.
pub async fn audit(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let ctx = AuditContext::default();
    let client_ip = client_ip(&req);
    req.extensions_mut().insert(ctx.clone());

    let response = next.run(req).await;

    let metrics = ctx.take();
    if !metrics.is_empty() && !state.audit.is_empty() {
        let subject = state.audit.clone();
        let event = AuditEvent::new(metrics, client_ip);
        tokio::spawn(async move {
            subject.notify_all(&event).await;
        });
    }
    response
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Client IP for audit events: first `X-Forwarded-For` element, else
/// `X-Real-IP`, else the peer address without its port.
fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = header_str(req, "X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header_str(req, "X-Real-IP") {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}
