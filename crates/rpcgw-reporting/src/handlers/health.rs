use std::future::Future;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rpcgw_storage::StoreResult;
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::state::ReportingState;

const READY_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct StoreCheck {
    healthy: bool,
    response_ms: u128,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

async fn probe(timeout: Duration, ping: impl Future<Output = StoreResult<()>>) -> StoreCheck {
    let started_at = Instant::now();
    let error = match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => String::new(),
        Ok(Err(err)) => err.to_string(),
        Err(_) => "ping timed out".to_string(),
    };
    StoreCheck {
        healthy: error.is_empty(),
        response_ms: started_at.elapsed().as_millis(),
        error,
    }
}

pub async fn live() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "time": now_rfc3339() })),
    )
}

pub async fn ready(State(state): State<ReportingState>) -> Response {
    let (clickhouse, postgresql) = tokio::join!(
        probe(READY_TIMEOUT, state.analytics.ping()),
        probe(READY_TIMEOUT, state.metadata.ping()),
    );
    let verdict = |check: &StoreCheck| {
        if check.healthy {
            "healthy".to_string()
        } else {
            format!("unhealthy: {}", check.error)
        }
    };
    let all_ready = clickhouse.healthy && postgresql.healthy;
    let (status, label) = if all_ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (
        status,
        Json(json!({
            "status": label,
            "checks": {
                "clickhouse": verdict(&clickhouse),
                "postgresql": verdict(&postgresql),
            },
            "time": now_rfc3339(),
        })),
    )
        .into_response()
}

pub async fn health(State(state): State<ReportingState>) -> Response {
    let (clickhouse, postgresql) = tokio::join!(
        probe(HEALTH_TIMEOUT, state.analytics.ping()),
        probe(HEALTH_TIMEOUT, state.metadata.ping()),
    );
    let (status, label) = if clickhouse.healthy && postgresql.healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(json!({
            "status": label,
            "checks": {
                "clickhouse": clickhouse,
                "postgresql": postgresql,
            },
            "timestamp": now_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}
