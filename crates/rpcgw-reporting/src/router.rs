use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Method;
use axum::middleware;
use axum::routing::get;
use rpcgw_common::log_requests;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::auth::{AdminKey, admin_auth};
use crate::handlers::{health, usage};
use crate::metrics::{HttpMetrics, metrics_handler, track_metrics};
use crate::ratelimit::{RateLimiter, rate_limit};
use crate::state::ReportingState;

pub struct RouterOptions {
    /// Guards `/api/v1/*` when set.
    pub admin_key: Option<AdminKey>,
    /// Applied to `/api/v1/*` when set.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            admin_key: None,
            rate_limiter: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub fn reporting_router(
    state: ReportingState,
    metrics: Arc<HttpMetrics>,
    options: RouterOptions,
) -> Router {
    let mut api = Router::new()
        .route(
            "/usage/organization/{org_id}/summary",
            get(usage::summary),
        )
        .route("/usage/organization/{org_id}/daily", get(usage::daily))
        .route("/usage/organization/{org_id}/hourly", get(usage::hourly))
        .route(
            "/usage/organization/{org_id}/by-chain",
            get(usage::by_chain),
        )
        .route(
            "/usage/organization/{org_id}/by-method",
            get(usage::by_method),
        )
        .route("/usage/key/{key_prefix}", get(usage::key_usage));
    if let Some(key) = options.admin_key {
        api = api.route_layer(middleware::from_fn_with_state(key, admin_auth));
    }
    if let Some(limiter) = options.rate_limiter {
        api = api.route_layer(middleware::from_fn_with_state(limiter, rate_limit));
    }

    let ops = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready));

    let exposition = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics.clone());

    Router::new()
        .nest("/api/v1", api)
        .merge(ops)
        .with_state(state)
        .merge(exposition)
        .layer(middleware::from_fn_with_state(metrics, track_metrics))
        .layer(middleware::from_fn(log_requests))
        .layer(cors())
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(CatchPanicLayer::new())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
