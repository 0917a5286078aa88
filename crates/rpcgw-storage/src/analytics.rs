use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{
    APIKeyUsage, ChainUsage, DailyUsage, HourlyUsage, MethodUsage, Period, SummaryMetrics,
};

/// Which rollup rows an aggregate is computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScope {
    Organization(String),
    ApiKey(String),
}

impl UsageScope {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            UsageScope::Organization(_) => "organization_id",
            UsageScope::ApiKey(_) => "api_key_prefix",
        }
    }

    pub(crate) fn value(&self) -> &str {
        match self {
            UsageScope::Organization(value) | UsageScope::ApiKey(value) => value,
        }
    }
}

/// Read side of the columnar rollup store. Every aggregate is computed by
/// the store; implementations only issue queries and decode rows.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn summary(&self, scope: &UsageScope, period: &Period) -> StoreResult<SummaryMetrics>;

    async fn usage_by_chain(
        &self,
        scope: &UsageScope,
        period: &Period,
    ) -> StoreResult<Vec<ChainUsage>>;

    /// `limit` outside [1, 100] falls back to 20.
    async fn usage_by_method(
        &self,
        organization_id: &str,
        period: &Period,
        limit: u32,
    ) -> StoreResult<Vec<MethodUsage>>;

    async fn daily_usage(&self, organization_id: &str, period: &Period)
    -> StoreResult<Vec<DailyUsage>>;

    async fn hourly_usage(
        &self,
        organization_id: &str,
        period: &Period,
        chain_slug: Option<&str>,
    ) -> StoreResult<Vec<HourlyUsage>>;

    /// `None` when no rollup row carries the prefix.
    async fn api_key_usage(
        &self,
        key_prefix: &str,
        period: &Period,
    ) -> StoreResult<Option<APIKeyUsage>>;
}

pub const DEFAULT_METHOD_LIMIT: u32 = 20;
pub const MAX_METHOD_LIMIT: u32 = 100;

pub(crate) fn effective_method_limit(limit: u32) -> u32 {
    if limit == 0 || limit > MAX_METHOD_LIMIT {
        DEFAULT_METHOD_LIMIT
    } else {
        limit
    }
}
