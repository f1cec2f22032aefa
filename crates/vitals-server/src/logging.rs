use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Access-log middleware: one structured line per completed request.
///
/// Outermost layer, so the logged status and size reflect the fully
/// processed response.
pub async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = status.as_u16(),
        size = bytes.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "Request completed"
    );

    Response::from_parts(parts, Body::from(bytes))
}
