use std::path::PathBuf;
use std::time::Duration;

use rpcgw_common::{ConfigError, ConfigLoader, LoggingConfig, duration_secs};
use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "auth-bridge";
pub const ENV_PREFIX: &str = "AUTH_BRIDGE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthBridgeConfig {
    pub server: ServerConfig,
    pub unkey: UnkeyConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
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
            port: 8081,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnkeyConfig {
    pub base_url: String,
    /// Root key for the verification API.
    pub api_key: String,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for UnkeyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://unkey:8080".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            ttl: Duration::from_secs(60),
            redis: RedisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "redis:6379".to_string(),
            password: String::new(),
            db: 0,
        }
    }
}

impl AuthBridgeConfig {
    pub fn loader(path: Option<PathBuf>) -> ConfigLoader {
        ConfigLoader::new(SERVICE_NAME, ENV_PREFIX).with_file(path)
    }

    /// Defaults, then the YAML file, then `AUTH_BRIDGE_*`; validated.
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let (config, source): (Self, _) = Self::loader(path).load()?;
        config.validate()?;
        Ok((config, source))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unkey.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("unkey.api_key".to_string()));
        }
        if self.unkey.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("unkey.base_url".to_string()));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "cache.ttl must be positive when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
