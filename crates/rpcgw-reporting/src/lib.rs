pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod params;
pub mod ratelimit;
pub mod router;
pub mod state;

pub use auth::AdminKey;
pub use config::{AuthConfig, RateLimitConfig, ReportingConfig, ServerConfig};
pub use metrics::HttpMetrics;
pub use params::{DateRangeError, UsageQuery};
pub use ratelimit::RateLimiter;
pub use router::{RouterOptions, reporting_router};
pub use state::ReportingState;
