use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

/// One `request_completed` event per request, keyed by the matched route
/// template so path parameters (org ids, key prefixes) stay out of the label.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let started_at = Instant::now();
    let method = req.method().clone();
    let path = route_label(&req);

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let elapsed_ms = started_at.elapsed().as_millis();
    if response.status().is_server_error() {
        warn!(event = "request_completed", method = %method, path = %path, status, elapsed_ms);
    } else {
        info!(event = "request_completed", method = %method, path = %path, status, elapsed_ms);
    }
    response
}

/// Matched route template, or the raw path for unmatched requests.
fn route_label(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}
