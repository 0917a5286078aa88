use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Inclusive query window, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_slug: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_requests: u64,
    pub total_compute_units: u64,
    pub total_egress_gb: f64,
    pub error_count: u64,
    pub error_rate_pct: f64,
    pub avg_latency_p95_ms: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub avg_latency_p99_ms: f64,
    #[serde(rename = "success_rate_pct")]
    pub success_rate: f64,
}

impl SummaryMetrics {
    /// `success_rate = 100 - error_rate` when any request was seen; both stay
    /// zero otherwise.
    pub fn with_success_rate(mut self) -> Self {
        if self.total_requests > 0 {
            self.success_rate = 100.0 - self.error_rate_pct;
        } else {
            self.error_rate_pct = 0.0;
            self.success_rate = 0.0;
        }
        self
    }
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainUsage {
    pub chain_slug: String,
    pub chain_type: String,
    pub requests: u64,
    pub compute_units: u64,
    pub egress_gb: f64,
    pub error_count: u64,
    pub error_rate_pct: f64,
    #[serde(rename = "avg_latency_p95_ms")]
    pub avg_latency_p95: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodUsage {
    pub method: String,
    pub requests: u64,
    pub compute_units: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub requests: u64,
    pub compute_units: u64,
    pub egress_gb: f64,
    pub error_count: u64,
    pub error_rate_pct: f64,
    #[serde(rename = "success_rate_pct")]
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyUsage {
    #[serde(with = "time::serde::rfc3339")]
    pub hour: OffsetDateTime,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chain_slug: String,
    pub requests: u64,
    pub compute_units: u64,
    pub egress_gb: f64,
    pub error_count: u64,
    #[serde(rename = "latency_p50_ms")]
    pub latency_p50: f64,
    #[serde(rename = "latency_p95_ms")]
    pub latency_p95: f64,
    #[serde(rename = "latency_p99_ms")]
    pub latency_p99: f64,
}

/// Organization-level aggregate. The breakdown fields are absent unless
/// requested and successfully computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub organization_id: String,
    pub period: Period,
    pub summary: SummaryMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_chain: Option<Vec<ChainUsage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_methods: Option<Vec<MethodUsage>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct APIKeyUsage {
    pub key_prefix: String,
    pub organization_id: String,
    pub period: Period,
    pub summary: SummaryMetrics,
    #[serde(default)]
    pub by_chain: Vec<ChainUsage>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_used: Option<OffsetDateTime>,
}
