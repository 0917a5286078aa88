use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rpcgw_common::error_response;
use rpcgw_storage::{Organization, Period, UsageScope, UsageSummary};
use serde_json::json;
use time::OffsetDateTime;
use tracing::warn;

use crate::params::{UsageQuery, ensure_hourly_window};
use crate::state::ReportingState;

/// Methods listed in a summary breakdown.
const TOP_METHODS: u32 = 10;

fn require_id(raw: &str, what: &str) -> Result<String, Response> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("{what} is required"),
        ));
    }
    Ok(id.to_string())
}

fn period_of(query: &UsageQuery) -> Result<Period, Response> {
    query
        .period(OffsetDateTime::now_utc())
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, err.to_string()))
}

fn store_failure(event: &'static str, message: &'static str, err: impl std::fmt::Display) -> Response {
    warn!(event = event, error = %err);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub async fn summary(
    State(state): State<ReportingState>,
    Path(org_id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let org_id = match require_id(&org_id, "organization id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let period = match period_of(&query) {
        Ok(period) => period,
        Err(resp) => return resp,
    };

    let organization: Organization = match state.metadata.organization(&org_id).await {
        Ok(Some(organization)) => organization,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "organization not found"),
        Err(err) => {
            return store_failure("organization_lookup_failed", "failed to get organization", err);
        }
    };

    let scope = UsageScope::Organization(org_id.clone());
    let metrics = match state.analytics.summary(&scope, &period).await {
        Ok(metrics) => metrics.with_success_rate(),
        Err(err) => return store_failure("usage_summary_failed", "failed to get usage summary", err),
    };

    let mut usage = UsageSummary {
        organization_id: org_id.clone(),
        period,
        summary: metrics,
        by_chain: None,
        top_methods: None,
    };

    if query.include_breakdown() {
        let (chains, methods) = tokio::join!(
            state.analytics.usage_by_chain(&scope, &period),
            state.analytics.usage_by_method(&org_id, &period, TOP_METHODS),
        );
        match chains {
            Ok(chains) => usage.by_chain = Some(chains),
            Err(err) => warn!(event = "usage_breakdown_failed", part = "by_chain", error = %err),
        }
        match methods {
            Ok(methods) => usage.top_methods = Some(methods),
            Err(err) => warn!(event = "usage_breakdown_failed", part = "top_methods", error = %err),
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "organization": {
                "id": organization.id,
                "name": organization.name,
                "plan_slug": organization.plan_slug,
            },
            "usage": usage,
        })),
    )
        .into_response()
}

pub async fn daily(
    State(state): State<ReportingState>,
    Path(org_id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let org_id = match require_id(&org_id, "organization id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let period = match period_of(&query) {
        Ok(period) => period,
        Err(resp) => return resp,
    };

    match state.analytics.daily_usage(&org_id, &period).await {
        Ok(days) => (
            StatusCode::OK,
            Json(json!({
                "organization_id": org_id,
                "period": period,
                "daily_usage": days,
            })),
        )
            .into_response(),
        Err(err) => store_failure("daily_usage_failed", "failed to get daily usage", err),
    }
}

pub async fn hourly(
    State(state): State<ReportingState>,
    Path(org_id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let org_id = match require_id(&org_id, "organization id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let period = match period_of(&query) {
        Ok(period) => period,
        Err(resp) => return resp,
    };
    if let Err(err) = ensure_hourly_window(&period) {
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }

    let chain = query.chain();
    match state.analytics.hourly_usage(&org_id, &period, chain).await {
        Ok(hours) => (
            StatusCode::OK,
            Json(json!({
                "organization_id": org_id,
                "chain_slug": chain.unwrap_or_default(),
                "period": period,
                "hourly_usage": hours,
            })),
        )
            .into_response(),
        Err(err) => store_failure("hourly_usage_failed", "failed to get hourly usage", err),
    }
}

pub async fn by_chain(
    State(state): State<ReportingState>,
    Path(org_id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let org_id = match require_id(&org_id, "organization id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let period = match period_of(&query) {
        Ok(period) => period,
        Err(resp) => return resp,
    };

    let scope = UsageScope::Organization(org_id.clone());
    match state.analytics.usage_by_chain(&scope, &period).await {
        Ok(chains) => (
            StatusCode::OK,
            Json(json!({
                "organization_id": org_id,
                "period": period,
                "by_chain": chains,
            })),
        )
            .into_response(),
        Err(err) => store_failure("chain_usage_failed", "failed to get usage by chain", err),
    }
}

pub async fn by_method(
    State(state): State<ReportingState>,
    Path(org_id): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let org_id = match require_id(&org_id, "organization id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let period = match period_of(&query) {
        Ok(period) => period,
        Err(resp) => return resp,
    };

    let limit = query.limit();
    match state.analytics.usage_by_method(&org_id, &period, limit).await {
        Ok(methods) => (
            StatusCode::OK,
            Json(json!({
                "organization_id": org_id,
                "period": period,
                "limit": limit,
                "by_method": methods,
            })),
        )
            .into_response(),
        Err(err) => store_failure("method_usage_failed", "failed to get usage by method", err),
    }
}

pub async fn key_usage(
    State(state): State<ReportingState>,
    Path(key_prefix): Path<String>,
    Query(query): Query<UsageQuery>,
) -> Response {
    let key_prefix = match require_id(&key_prefix, "key prefix") {
        Ok(prefix) => prefix,
        Err(resp) => return resp,
    };
    let period = match period_of(&query) {
        Ok(period) => period,
        Err(resp) => return resp,
    };

    match state.analytics.api_key_usage(&key_prefix, &period).await {
        Ok(Some(mut usage)) => {
            usage.summary = usage.summary.with_success_rate();
            (StatusCode::OK, Json(usage)).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "api key not found"),
        Err(err) => store_failure("key_usage_failed", "failed to get key usage", err),
    }
}
