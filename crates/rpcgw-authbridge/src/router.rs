use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use rpcgw_common::log_requests;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handler::{BridgeState, healthz, verify};

/// `GET /healthz` and `POST /api/v1/verify`, wrapped in request logging,
/// a whole-request timeout and panic recovery.
pub fn bridge_router(state: BridgeState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/verify", post(verify))
        .layer(middleware::from_fn(log_requests))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
