use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rpcgw_reporting::{
    AdminKey, HttpMetrics, RateLimiter, ReportingState, RouterOptions, reporting_router,
};
use rpcgw_storage::{
    APIKeyUsage, AnalyticsRepository, ChainUsage, DailyUsage, HourlyUsage, MetadataRepository,
    MethodUsage, Organization, Period, StoreError, StoreResult, SummaryMetrics, UsageScope,
};
use serde_json::Value;
use time::macros::datetime;
use tower::ServiceExt;

#[derive(Default)]
struct FakeAnalytics {
    down: AtomicBool,
    breakdown_down: AtomicBool,
    method_limits: Mutex<Vec<u32>>,
    hourly_chains: Mutex<Vec<Option<String>>>,
}

fn store_down() -> StoreError {
    StoreError::Query {
        status: 500,
        message: "Code: 159. DB::Exception: Timeout exceeded".to_string(),
    }
}

#[async_trait]
impl AnalyticsRepository for FakeAnalytics {
    async fn ping(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        Ok(())
    }

    async fn summary(&self, _scope: &UsageScope, _period: &Period) -> StoreResult<SummaryMetrics> {
        if self.down.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        Ok(SummaryMetrics {
            total_requests: 1_000,
            total_compute_units: 10_000,
            total_egress_gb: 0.5,
            error_count: 25,
            error_rate_pct: 2.5,
            avg_latency_p95_ms: 120.0,
            avg_latency_p99_ms: 240.0,
            success_rate: 0.0,
        })
    }

    async fn usage_by_chain(&self, _scope: &UsageScope, _period: &Period) -> StoreResult<Vec<ChainUsage>> {
        if self.breakdown_down.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        Ok(vec![ChainUsage {
            chain_slug: "ethereum".to_string(),
            chain_type: "evm".to_string(),
            requests: 1_000,
            ..ChainUsage::default()
        }])
    }

    async fn usage_by_method(
        &self,
        _organization_id: &str,
        _period: &Period,
        limit: u32,
    ) -> StoreResult<Vec<MethodUsage>> {
        self.method_limits.lock().unwrap().push(limit);
        if self.breakdown_down.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        Ok(vec![MethodUsage {
            method: "eth_call".to_string(),
            requests: 600,
            ..MethodUsage::default()
        }])
    }

    async fn daily_usage(&self, _organization_id: &str, period: &Period) -> StoreResult<Vec<DailyUsage>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        Ok(vec![DailyUsage {
            date: period.start,
            requests: 10,
            compute_units: 100,
            egress_gb: 0.0,
            error_count: 1,
            error_rate_pct: 10.0,
            success_rate: 90.0,
        }])
    }

    async fn hourly_usage(
        &self,
        _organization_id: &str,
        period: &Period,
        chain_slug: Option<&str>,
    ) -> StoreResult<Vec<HourlyUsage>> {
        self.hourly_chains
            .lock()
            .unwrap()
            .push(chain_slug.map(str::to_string));
        Ok(vec![HourlyUsage {
            hour: period.start,
            chain_slug: chain_slug.unwrap_or_default().to_string(),
            requests: 5,
            compute_units: 50,
            egress_gb: 0.0,
            error_count: 0,
            latency_p50: 10.0,
            latency_p95: 20.0,
            latency_p99: 30.0,
        }])
    }

    async fn api_key_usage(&self, key_prefix: &str, period: &Period) -> StoreResult<Option<APIKeyUsage>> {
        if key_prefix != "rpc_live_ab" {
            return Ok(None);
        }
        Ok(Some(APIKeyUsage {
            key_prefix: key_prefix.to_string(),
            organization_id: "org1".to_string(),
            period: *period,
            summary: SummaryMetrics {
                total_requests: 200,
                error_rate_pct: 1.0,
                ..SummaryMetrics::default()
            },
            by_chain: Vec::new(),
            last_used: Some(datetime!(2024-01-20 00:00:00 UTC)),
        }))
    }
}

#[derive(Default)]
struct FakeMetadata {
    down: AtomicBool,
}

#[async_trait]
impl MetadataRepository for FakeMetadata {
    async fn ping(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Config("connection refused".to_string()));
        }
        Ok(())
    }

    async fn organization(&self, id: &str) -> StoreResult<Option<Organization>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Config("connection refused".to_string()));
        }
        if id != "org1" {
            return Ok(None);
        }
        Ok(Some(Organization {
            id: "org1".to_string(),
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            plan_slug: "growth".to_string(),
            status: "active".to_string(),
            created_at: datetime!(2023-06-01 00:00:00 UTC),
        }))
    }
}

struct Harness {
    analytics: Arc<FakeAnalytics>,
    metadata: Arc<FakeMetadata>,
    app: Router,
}

fn harness(options: RouterOptions) -> Harness {
    let analytics = Arc::new(FakeAnalytics::default());
    let metadata = Arc::new(FakeMetadata::default());
    let state = ReportingState::new(analytics.clone(), metadata.clone());
    let metrics = Arc::new(HttpMetrics::new().unwrap());
    Harness {
        analytics,
        metadata,
        app: reporting_router(state, metrics, options),
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    get_with(app, uri, None).await
}

async fn get_with(app: &Router, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = bearer {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

const JANUARY: &str = "start_date=2024-01-01&end_date=2024-01-31";

#[tokio::test]
async fn summary_wraps_usage_in_organization_envelope() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/summary?{JANUARY}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organization"]["id"], "org1");
    assert_eq!(body["organization"]["plan_slug"], "growth");
    let summary = &body["usage"]["summary"];
    assert!(summary.is_object());
    assert_eq!(summary["total_requests"], 1000);
    assert_eq!(summary["success_rate_pct"], 97.5);
    assert_eq!(body["usage"]["period"]["start"], "2024-01-01T00:00:00Z");
    assert_eq!(body["usage"]["period"]["end"], "2024-01-31T23:59:59Z");
    assert!(body["usage"].get("by_chain").is_none());
    assert!(body["usage"].get("top_methods").is_none());
}

#[tokio::test]
async fn summary_breakdown_adds_chains_and_top_ten_methods() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/summary?{JANUARY}&include_breakdown=true"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usage"]["by_chain"][0]["chain_slug"], "ethereum");
    assert_eq!(body["usage"]["top_methods"][0]["method"], "eth_call");
    assert_eq!(*h.analytics.method_limits.lock().unwrap(), vec![10]);
}

#[tokio::test]
async fn failed_breakdown_is_omitted_not_fatal() {
    let h = harness(RouterOptions::default());
    h.analytics.breakdown_down.store(true, Ordering::SeqCst);
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/summary?{JANUARY}&include_breakdown=true"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["usage"].get("by_chain").is_none());
    assert!(body["usage"].get("top_methods").is_none());
    assert!(body["usage"]["summary"].is_object());
}

#[tokio::test]
async fn unknown_organization_is_not_found() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/nope/summary?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "organization not found");
}

#[tokio::test]
async fn store_failures_are_generic_server_errors() {
    let h = harness(RouterOptions::default());
    h.analytics.down.store(true, Ordering::SeqCst);

    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/summary?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "failed to get usage summary");

    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/daily?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "failed to get daily usage");
    assert!(!body.to_string().contains("DB::Exception"));

    h.analytics.down.store(false, Ordering::SeqCst);
    h.metadata.down.store(true, Ordering::SeqCst);
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/summary?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "failed to get organization");
}

#[tokio::test]
async fn date_range_violations_are_bad_requests() {
    let h = harness(RouterOptions::default());
    let cases = [
        (
            "start_date=2024-02-10&end_date=2024-02-01",
            "end_date must be after start_date",
        ),
        (
            "start_date=2023-01-01&end_date=2024-01-31",
            "date range cannot exceed 1 year",
        ),
        (
            "start_date=2024-1-5",
            "invalid start_date \"2024-1-5\", use YYYY-MM-DD",
        ),
    ];
    for (query, message) in cases {
        let (status, body) = get(
            &h.app,
            &format!("/api/v1/usage/organization/org1/daily?{query}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body["error"], message);
    }
}

#[tokio::test]
async fn daily_series_carries_period() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/daily?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organization_id"], "org1");
    assert_eq!(body["period"]["start"], "2024-01-01T00:00:00Z");
    assert_eq!(body["daily_usage"][0]["success_rate_pct"], 90.0);
}

#[tokio::test]
async fn hourly_is_limited_to_a_week_and_filters_by_chain() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/hourly?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "hourly data limited to 7 days maximum");

    let (status, body) = get(
        &h.app,
        "/api/v1/usage/organization/org1/hourly?start_date=2024-01-01&end_date=2024-01-07&chain=ethereum",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chain_slug"], "ethereum");
    assert_eq!(body["hourly_usage"][0]["latency_p99_ms"], 30.0);

    let (status, body) = get(
        &h.app,
        "/api/v1/usage/organization/org1/hourly?start_date=2024-01-01&end_date=2024-01-02",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chain_slug"], "");
    assert_eq!(
        *h.analytics.hourly_chains.lock().unwrap(),
        vec![Some("ethereum".to_string()), None]
    );
}

#[tokio::test]
async fn by_chain_and_by_method_breakdowns() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/by-chain?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["by_chain"][0]["chain_type"], "evm");

    let (status, body) = get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/by-method?{JANUARY}&limit=500"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["by_method"][0]["method"], "eth_call");

    get(
        &h.app,
        &format!("/api/v1/usage/organization/org1/by-method?{JANUARY}"),
    )
    .await;
    assert_eq!(*h.analytics.method_limits.lock().unwrap(), vec![100, 20]);
}

#[tokio::test]
async fn key_usage_resolves_owner_or_is_not_found() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(&h.app, &format!("/api/v1/usage/key/rpc_live_ab?{JANUARY}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organization_id"], "org1");
    assert_eq!(body["summary"]["success_rate_pct"], 99.0);
    assert_eq!(body["last_used"], "2024-01-20T00:00:00Z");

    let (status, body) = get(&h.app, &format!("/api/v1/usage/key/rpc_unknown?{JANUARY}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "api key not found");
}

#[tokio::test]
async fn admin_auth_guards_api_routes_only() {
    let h = harness(RouterOptions {
        admin_key: Some(AdminKey::new("s3cret")),
        ..RouterOptions::default()
    });
    let uri = format!("/api/v1/usage/organization/org1/daily?{JANUARY}");

    let (status, body) = get(&h.app, &uri).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authorization header required");

    let (status, body) = get_with(&h.app, &uri, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid api key");

    let (status, _) = get_with(&h.app, &uri, Some("s3cret")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&h.app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_rejects_after_budget() {
    let h = harness(RouterOptions {
        rate_limiter: Some(Arc::new(RateLimiter::new(2, Duration::from_secs(60)))),
        ..RouterOptions::default()
    });
    let uri = format!("/api/v1/usage/organization/org1/daily?{JANUARY}");

    assert_eq!(get(&h.app, &uri).await.0, StatusCode::OK);
    assert_eq!(get(&h.app, &uri).await.0, StatusCode::OK);
    let (status, body) = get(&h.app, &uri).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded");
    assert!(body["retry_after"].as_u64().unwrap() >= 1);

    // A different bearer is a different bucket.
    let (status, _) = get_with(&h.app, &uri, Some("other")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(get(&h.app, "/health/live").await.0, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_each_store() {
    let h = harness(RouterOptions::default());
    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["clickhouse"]["healthy"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    h.metadata.down.store(true, Ordering::SeqCst);
    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["postgresql"]["healthy"], false);
    assert!(
        body["checks"]["postgresql"]["error"]
            .as_str()
            .unwrap()
            .contains("connection refused")
    );

    let (status, body) = get(&h.app, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["checks"]["clickhouse"], "healthy");
    assert!(
        body["checks"]["postgresql"]
            .as_str()
            .unwrap()
            .starts_with("unhealthy: ")
    );

    let (status, body) = get(&h.app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn metrics_are_labelled_by_route_template() {
    let h = harness(RouterOptions::default());
    get(&h.app, &format!("/api/v1/usage/key/rpc_live_ab?{JANUARY}")).await;

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    assert!(text.contains(r#"path="/api/v1/usage/key/{key_prefix}""#));
    assert!(!text.contains("rpc_live_ab"));
    assert!(text.contains("http_request_duration_seconds"));
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let h = harness(RouterOptions {
        admin_key: Some(AdminKey::new("s3cret")),
        ..RouterOptions::default()
    });
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/usage/key/rpc_live_ab")
                .header("origin", "https://dashboard.example")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}
