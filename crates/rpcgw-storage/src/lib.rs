pub mod analytics;
pub mod clickhouse;
pub mod error;
pub mod metadata;
pub mod models;
pub mod postgres;

pub use analytics::{AnalyticsRepository, DEFAULT_METHOD_LIMIT, MAX_METHOD_LIMIT, UsageScope};
pub use clickhouse::{ClickHouseConfig, ClickHouseRepository};
pub use error::{StoreError, StoreResult};
pub use metadata::MetadataRepository;
pub use models::{
    APIKeyUsage, ChainUsage, DailyUsage, HourlyUsage, MethodUsage, Organization, Period,
    SummaryMetrics, UsageSummary,
};
pub use postgres::{PostgresConfig, PostgresRepository};
