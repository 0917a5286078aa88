//! Rollup queries over the ClickHouse HTTP interface.
//!
//! Rows come back as `JSONEachRow`; values are bound through `{name:Type}`
//! placeholders and sent as `param_<name>` URL parameters, never spliced into
//! the SQL text.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;
use wreq::Client;

use crate::analytics::{AnalyticsRepository, UsageScope, effective_method_limit};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    APIKeyUsage, ChainUsage, DailyUsage, HourlyUsage, MethodUsage, Period, SummaryMetrics,
};

const PING_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CHAIN_LIMIT: u32 = 50;
const HOURLY_LIMIT: u32 = 500;
const ERROR_BODY_LIMIT: usize = 512;

const PARAM_DATETIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const EGRESS_GB: &str = "sumMerge(total_response_size) / 1073741824.0";
const ERROR_RATE: &str =
    "ifNull(sumMerge(error_count) / nullIf(sumMerge(request_count), 0) * 100, 0)";
const DAILY_WINDOW: &str =
    "date >= toDate({start:DateTime('UTC')}) AND date <= toDate({end:DateTime('UTC')})";
const HOURLY_WINDOW: &str = "hour >= {start:DateTime('UTC')} AND hour <= {end:DateTime('UTC')}";

fn latency_quantile(index: u8) -> String {
    format!(
        "ifNotFinite(toFloat64(arrayElement(quantilesMerge(0.5, 0.95, 0.99)(latency_ms_quantiles), {index})), 0)"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub host: String,
    /// HTTP interface port.
    pub port: u16,
    pub secure: bool,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Server-side ceiling per query, seconds.
    pub max_execution_time: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            secure: false,
            database: "telemetry".to_string(),
            username: "default".to_string(),
            password: String::new(),
            max_execution_time: 60,
        }
    }
}

impl ClickHouseConfig {
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host.trim(), self.port)
    }
}

#[derive(Clone)]
pub struct ClickHouseRepository {
    client: Client,
    ping_client: Client,
    endpoint: String,
    config: ClickHouseConfig,
}

impl ClickHouseRepository {
    pub fn new(config: ClickHouseConfig) -> StoreResult<Self> {
        if config.host.trim().is_empty() {
            return Err(StoreError::Config("clickhouse host is required".to_string()));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.max_execution_time.max(1) + 5))
            .build()?;
        let ping_client = Client::builder()
            .connect_timeout(PING_TIMEOUT)
            .timeout(PING_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            ping_client,
            endpoint: config.endpoint(),
            config,
        })
    }

    /// Builds the repository and verifies the server answers.
    pub async fn connect(config: ClickHouseConfig) -> StoreResult<Self> {
        let repo = Self::new(config)?;
        repo.ping().await?;
        Ok(repo)
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[(&str, String)],
        probe: bool,
    ) -> StoreResult<String> {
        let mut query = vec![
            ("database".to_string(), self.config.database.clone()),
            (
                "max_execution_time".to_string(),
                self.config.max_execution_time.to_string(),
            ),
            (
                "output_format_json_quote_64bit_integers".to_string(),
                "0".to_string(),
            ),
        ];
        query.extend(
            params
                .iter()
                .map(|(name, value)| (format!("param_{name}"), value.clone())),
        );
        let query = query
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/?{query}", self.endpoint);

        let client = if probe { &self.ping_client } else { &self.client };
        let mut request = client
            .post(url.as_str())
            .header("content-type", "text/plain; charset=utf-8")
            .body(sql.to_string());
        if !self.config.username.is_empty() {
            request = request.header("x-clickhouse-user", self.config.username.as_str());
        }
        if !self.config.password.is_empty() {
            request = request.header("x-clickhouse-key", self.config.password.as_str());
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            let mut message = body.trim().to_string();
            if message.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(StoreError::Query { status, message });
        }
        Ok(body)
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        name: &'static str,
        sql: &str,
        params: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let started = Instant::now();
        let body = self.execute(sql, params, false).await?;
        let rows = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect::<StoreResult<Vec<T>>>()?;
        debug!(
            event = "clickhouse_query",
            query = name,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        Ok(rows)
    }
}

fn window_params(period: &Period) -> StoreResult<Vec<(&'static str, String)>> {
    Ok(vec![
        ("start", format_param(period.start)?),
        ("end", format_param(period.end)?),
    ])
}

fn format_param(at: OffsetDateTime) -> StoreResult<String> {
    Ok(at.to_offset(UtcOffset::UTC).format(PARAM_DATETIME)?)
}

fn from_unix(seconds: i64) -> StoreResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp(seconds)?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryRow {
    total_requests: u64,
    total_compute_units: u64,
    total_egress_gb: Option<f64>,
    error_count: u64,
    error_rate_pct: Option<f64>,
    latency_p95: Option<f64>,
    latency_p99: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChainRow {
    chain_slug: String,
    chain_type: String,
    requests: u64,
    compute_units: u64,
    egress_gb: Option<f64>,
    error_count: u64,
    error_rate_pct: Option<f64>,
    latency_p95: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MethodRow {
    rpc_method: String,
    requests: u64,
    compute_units: u64,
    error_count: u64,
    latency_p50: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyRow {
    day: i64,
    requests: u64,
    compute_units: u64,
    egress_gb: Option<f64>,
    error_count: u64,
    error_rate_pct: Option<f64>,
    success_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HourlyRow {
    hour_ts: i64,
    chain_slug: String,
    requests: u64,
    compute_units: u64,
    egress_gb: Option<f64>,
    error_count: u64,
    latency_p50: Option<f64>,
    latency_p95: Option<f64>,
    latency_p99: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeyOwnerRow {
    organization_id: String,
    last_used: i64,
}

#[async_trait]
impl AnalyticsRepository for ClickHouseRepository {
    async fn ping(&self) -> StoreResult<()> {
        self.execute("SELECT 1", &[], true).await?;
        Ok(())
    }

    async fn summary(&self, scope: &UsageScope, period: &Period) -> StoreResult<SummaryMetrics> {
        let sql = format!(
            "SELECT sumMerge(request_count) AS total_requests, \
             sumMerge(compute_units_used) AS total_compute_units, \
             {EGRESS_GB} AS total_egress_gb, \
             sumMerge(error_count) AS error_count, \
             {ERROR_RATE} AS error_rate_pct, \
             {p95} AS latency_p95, \
             {p99} AS latency_p99 \
             FROM usage_daily \
             WHERE {column} = {{scope:String}} AND {DAILY_WINDOW} \
             FORMAT JSONEachRow",
            p95 = latency_quantile(2),
            p99 = latency_quantile(3),
            column = scope.column(),
        );
        let mut params = window_params(period)?;
        params.push(("scope", scope.value().to_string()));

        let row = self
            .rows::<SummaryRow>("summary", &sql, &params)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(SummaryMetrics {
            total_requests: row.total_requests,
            total_compute_units: row.total_compute_units,
            total_egress_gb: row.total_egress_gb.unwrap_or_default(),
            error_count: row.error_count,
            error_rate_pct: row.error_rate_pct.unwrap_or_default(),
            avg_latency_p95_ms: row.latency_p95.unwrap_or_default(),
            avg_latency_p99_ms: row.latency_p99.unwrap_or_default(),
            success_rate: 0.0,
        }
        .with_success_rate())
    }

    async fn usage_by_chain(
        &self,
        scope: &UsageScope,
        period: &Period,
    ) -> StoreResult<Vec<ChainUsage>> {
        let sql = format!(
            "SELECT chain_slug, chain_type, \
             sumMerge(request_count) AS requests, \
             sumMerge(compute_units_used) AS compute_units, \
             {EGRESS_GB} AS egress_gb, \
             sumMerge(error_count) AS error_count, \
             {ERROR_RATE} AS error_rate_pct, \
             {p95} AS latency_p95 \
             FROM usage_daily \
             WHERE {column} = {{scope:String}} AND {DAILY_WINDOW} \
             GROUP BY chain_slug, chain_type \
             ORDER BY requests DESC \
             LIMIT {CHAIN_LIMIT} \
             FORMAT JSONEachRow",
            p95 = latency_quantile(2),
            column = scope.column(),
        );
        let mut params = window_params(period)?;
        params.push(("scope", scope.value().to_string()));

        let rows = self.rows::<ChainRow>("usage_by_chain", &sql, &params).await?;
        Ok(rows
            .into_iter()
            .map(|row| ChainUsage {
                chain_slug: row.chain_slug,
                chain_type: row.chain_type,
                requests: row.requests,
                compute_units: row.compute_units,
                egress_gb: row.egress_gb.unwrap_or_default(),
                error_count: row.error_count,
                error_rate_pct: row.error_rate_pct.unwrap_or_default(),
                avg_latency_p95: row.latency_p95.unwrap_or_default(),
            })
            .collect())
    }

    async fn usage_by_method(
        &self,
        organization_id: &str,
        period: &Period,
        limit: u32,
    ) -> StoreResult<Vec<MethodUsage>> {
        let sql = format!(
            "SELECT rpc_method, \
             sumMerge(request_count) AS requests, \
             sumMerge(compute_units_used) AS compute_units, \
             sumMerge(error_count) AS error_count, \
             {p50} AS latency_p50 \
             FROM usage_hourly \
             WHERE organization_id = {{org:String}} AND {HOURLY_WINDOW} AND rpc_method != '' \
             GROUP BY rpc_method \
             ORDER BY requests DESC \
             LIMIT {{limit:UInt32}} \
             FORMAT JSONEachRow",
            p50 = latency_quantile(1),
        );
        let mut params = window_params(period)?;
        params.push(("org", organization_id.to_string()));
        params.push(("limit", effective_method_limit(limit).to_string()));

        let rows = self.rows::<MethodRow>("usage_by_method", &sql, &params).await?;
        Ok(rows
            .into_iter()
            .map(|row| MethodUsage {
                method: row.rpc_method,
                requests: row.requests,
                compute_units: row.compute_units,
                error_count: row.error_count,
                avg_latency_ms: row.latency_p50.unwrap_or_default(),
            })
            .collect())
    }

    async fn daily_usage(
        &self,
        organization_id: &str,
        period: &Period,
    ) -> StoreResult<Vec<DailyUsage>> {
        let sql = format!(
            "SELECT toUnixTimestamp(toDateTime(date, 'UTC')) AS day, \
             sumMerge(request_count) AS requests, \
             sumMerge(compute_units_used) AS compute_units, \
             {EGRESS_GB} AS egress_gb, \
             sumMerge(error_count) AS error_count, \
             {ERROR_RATE} AS error_rate_pct, \
             ifNull(sumMerge(status_2xx_count) / nullIf(sumMerge(request_count), 0) * 100, 0) AS success_rate \
             FROM usage_daily \
             WHERE organization_id = {{org:String}} AND {DAILY_WINDOW} \
             GROUP BY date \
             ORDER BY date ASC \
             FORMAT JSONEachRow"
        );
        let mut params = window_params(period)?;
        params.push(("org", organization_id.to_string()));

        let rows = self.rows::<DailyRow>("daily_usage", &sql, &params).await?;
        rows.into_iter()
            .map(|row| {
                Ok(DailyUsage {
                    date: from_unix(row.day)?,
                    requests: row.requests,
                    compute_units: row.compute_units,
                    egress_gb: row.egress_gb.unwrap_or_default(),
                    error_count: row.error_count,
                    error_rate_pct: row.error_rate_pct.unwrap_or_default(),
                    success_rate: row.success_rate.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn hourly_usage(
        &self,
        organization_id: &str,
        period: &Period,
        chain_slug: Option<&str>,
    ) -> StoreResult<Vec<HourlyUsage>> {
        let chain_filter = if chain_slug.is_some() {
            " AND chain_slug = {chain:String}"
        } else {
            ""
        };
        let sql = format!(
            "SELECT toUnixTimestamp(hour) AS hour_ts, chain_slug, \
             sumMerge(request_count) AS requests, \
             sumMerge(compute_units_used) AS compute_units, \
             {EGRESS_GB} AS egress_gb, \
             sumMerge(error_count) AS error_count, \
             {p50} AS latency_p50, \
             {p95} AS latency_p95, \
             {p99} AS latency_p99 \
             FROM usage_hourly \
             WHERE organization_id = {{org:String}} AND {HOURLY_WINDOW}{chain_filter} \
             GROUP BY hour, chain_slug \
             ORDER BY hour ASC \
             LIMIT {HOURLY_LIMIT} \
             FORMAT JSONEachRow",
            p50 = latency_quantile(1),
            p95 = latency_quantile(2),
            p99 = latency_quantile(3),
        );
        let mut params = window_params(period)?;
        params.push(("org", organization_id.to_string()));
        if let Some(chain) = chain_slug {
            params.push(("chain", chain.to_string()));
        }

        let rows = self.rows::<HourlyRow>("hourly_usage", &sql, &params).await?;
        rows.into_iter()
            .map(|row| {
                Ok(HourlyUsage {
                    hour: from_unix(row.hour_ts)?,
                    chain_slug: row.chain_slug,
                    requests: row.requests,
                    compute_units: row.compute_units,
                    egress_gb: row.egress_gb.unwrap_or_default(),
                    error_count: row.error_count,
                    latency_p50: row.latency_p50.unwrap_or_default(),
                    latency_p95: row.latency_p95.unwrap_or_default(),
                    latency_p99: row.latency_p99.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn api_key_usage(
        &self,
        key_prefix: &str,
        period: &Period,
    ) -> StoreResult<Option<APIKeyUsage>> {
        let owner_sql = "SELECT organization_id, \
             toUnixTimestamp(toDateTime(max(date), 'UTC')) AS last_used \
             FROM usage_daily \
             WHERE api_key_prefix = {scope:String} \
             GROUP BY organization_id \
             ORDER BY last_used DESC \
             LIMIT 1 \
             FORMAT JSONEachRow";
        let owner = self
            .rows::<KeyOwnerRow>("key_owner", owner_sql, &[("scope", key_prefix.to_string())])
            .await?
            .into_iter()
            .next();
        let Some(owner) = owner else {
            return Ok(None);
        };

        let scope = UsageScope::ApiKey(key_prefix.to_string());
        let summary = self.summary(&scope, period).await?;
        let by_chain = self.usage_by_chain(&scope, period).await?;
        let last_used = if owner.last_used > 0 {
            Some(from_unix(owner.last_used)?)
        } else {
            None
        };

        Ok(Some(APIKeyUsage {
            key_prefix: key_prefix.to_string(),
            organization_id: owner.organization_id,
            period: *period,
            summary,
            by_chain,
            last_used,
        }))
    }
}
