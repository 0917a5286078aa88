use std::path::PathBuf;
use std::time::Duration;

use rpcgw_common::{ConfigError, ConfigLoader, LoggingConfig, duration_secs};
use rpcgw_storage::{ClickHouseConfig, PostgresConfig};
use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "reporting-api";
pub const ENV_PREFIX: &str = "REPORTING_API";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub server: ServerConfig,
    pub clickhouse: ClickHouseConfig,
    pub postgresql: PostgresConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Free-form deployment label, logged at startup.
    pub environment: String,
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub write_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub admin_api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Tokens granted per window, also the bucket size.
    pub requests: u32,
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl ReportingConfig {
    pub fn loader(path: Option<PathBuf>) -> ConfigLoader {
        ConfigLoader::new(SERVICE_NAME, ENV_PREFIX).with_file(path)
    }

    /// Defaults, then the YAML file, then `REPORTING_API_*`; validated.
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let (config, source): (Self, _) = Self::loader(path).load()?;
        config.validate()?;
        Ok((config, source))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Missing("server.port".to_string()));
        }
        if self.clickhouse.host.trim().is_empty() {
            return Err(ConfigError::Missing("clickhouse.host".to_string()));
        }
        if self.postgresql.host.trim().is_empty() {
            return Err(ConfigError::Missing("postgresql.host".to_string()));
        }
        if self.auth.enabled && self.auth.admin_api_key.trim().is_empty() {
            return Err(ConfigError::Missing(
                "auth.admin_api_key (auth is enabled)".to_string(),
            ));
        }
        if self.rate_limit.enabled && (self.rate_limit.requests == 0 || self.rate_limit.window.is_zero()) {
            return Err(ConfigError::Invalid(
                "rate_limit.requests and rate_limit.window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
