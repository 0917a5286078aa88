use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {name}: {value:?}")]
    Env { name: String, value: String },
    #[error("failed to build config: {0}")]
    Build(#[from] serde_json::Error),
    #[error("{0} is required")]
    Missing(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

const FILE_NAMES: [&str; 2] = ["config.yaml", "config.yml"];

/// Layered configuration: serde defaults, then an optional YAML file, then
/// environment variables named `<PREFIX>_<DOTTED_PATH>` with `.` replaced by `_`.
///
/// Only keys present in the defaults tree are bound from the environment, and
/// each value is coerced to the JSON type of its default.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    search_dirs: Vec<PathBuf>,
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(service: &str, env_prefix: &str) -> Self {
        Self {
            env_prefix: env_prefix.trim_end_matches('_').to_ascii_uppercase(),
            search_dirs: vec![
                PathBuf::from("."),
                PathBuf::from("./config"),
                PathBuf::from("/etc").join(service),
            ],
            explicit: None,
        }
    }

    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn env_name(&self, dotted: &str) -> String {
        format!(
            "{}_{}",
            self.env_prefix,
            dotted.replace('.', "_").to_ascii_uppercase()
        )
    }

    /// The file that `load` would read, if any.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.explicit.as_ref() {
            return Some(path.clone());
        }
        self.search_dirs
            .iter()
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }

    pub fn load<T>(&self) -> Result<(T, Option<PathBuf>), ConfigError>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        self.load_with(|name| std::env::var(name).ok())
    }

    pub fn load_with<T, F>(&self, lookup: F) -> Result<(T, Option<PathBuf>), ConfigError>
    where
        T: Default + Serialize + DeserializeOwned,
        F: Fn(&str) -> Option<String>,
    {
        let defaults = serde_json::to_value(T::default())?;
        let mut merged = defaults.clone();

        let source = self.locate();
        if let Some(path) = source.as_deref() {
            overlay(&mut merged, read_yaml(path)?);
        }

        let mut leaves = Vec::new();
        collect_leaves(&defaults, "", &mut leaves);
        for (path, default) in leaves {
            let name = self.env_name(&path);
            let Some(raw) = lookup(&name).filter(|value| !value.is_empty()) else {
                continue;
            };
            let Some(value) = coerce(default, &raw) else {
                return Err(ConfigError::Env { name, value: raw });
            };
            set_path(&mut merged, &path, value);
        }

        let config = serde_json::from_value(merged)?;
        Ok((config, source))
    }
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn overlay(base: &mut Value, other: Value) {
    match (base, other) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn collect_leaves<'a>(value: &'a Value, prefix: &str, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaves(child, &path, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf)),
    }
}

fn coerce(default: &Value, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match default {
        Value::Bool(_) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(number) if number.is_u64() => raw.parse::<u64>().ok().map(Value::from),
        Value::Number(number) if number.is_i64() => raw.parse::<i64>().ok().map(Value::from),
        Value::Number(_) => raw.parse::<f64>().ok().map(Value::from),
        Value::Array(_) => Some(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        Value::String(_) | Value::Null => Some(Value::String(raw.to_string())),
        Value::Object(_) => None,
    }
}

fn set_path(root: &mut Value, dotted: &str, value: Value) {
    let mut cursor = root;
    for segment in dotted.split('.') {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        cursor = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    *cursor = value;
}

/// `Duration` as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        server: Server,
        cache: Cache,
        secret: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Server {
        port: u16,
        #[serde(with = "duration_secs")]
        read_timeout: Duration,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Cache {
        enabled: bool,
        ratio: f64,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                server: Server::default(),
                cache: Cache::default(),
                secret: None,
            }
        }
    }

    impl Default for Server {
        fn default() -> Self {
            Self {
                port: 8081,
                read_timeout: Duration::from_secs(5),
            }
        }
    }

    impl Default for Cache {
        fn default() -> Self {
            Self {
                enabled: true,
                ratio: 0.5,
            }
        }
    }

    fn loader_in(dir: &Path) -> ConfigLoader {
        ConfigLoader::new("sample", "SAMPLE").with_search_dirs(vec![dir.to_path_buf()])
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let (config, source): (Sample, _) = loader_in(dir.path()).load_with(|_| None).unwrap();
        assert!(source.is_none());
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn env_overrides_file_and_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("config.yaml")).unwrap();
        writeln!(file, "server:\n  port: 9000\n  read_timeout: 7\ncache:\n  enabled: false").unwrap();

        let env: HashMap<&str, &str> = [("SAMPLE_SERVER_PORT", "9100"), ("SAMPLE_SECRET", "s3")]
            .into_iter()
            .collect();
        let (config, source): (Sample, _) = loader_in(dir.path())
            .load_with(|name| env.get(name).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(source, Some(dir.path().join("config.yaml")));
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.read_timeout, Duration::from_secs(7));
        assert!(!config.cache.enabled);
        assert_eq!(config.secret.as_deref(), Some("s3"));
    }

    #[test]
    fn env_values_are_coerced_to_default_types() {
        let dir = tempfile::tempdir().unwrap();
        let env: HashMap<&str, &str> = [
            ("SAMPLE_CACHE_ENABLED", "0"),
            ("SAMPLE_CACHE_RATIO", "0.25"),
            ("SAMPLE_SERVER_READ_TIMEOUT", "12"),
        ]
        .into_iter()
        .collect();
        let (config, _): (Sample, _) = loader_in(dir.path())
            .load_with(|name| env.get(name).map(|value| value.to_string()))
            .unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ratio, 0.25);
        assert_eq!(config.server.read_timeout, Duration::from_secs(12));
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader_in(dir.path())
            .load_with::<Sample, _>(|name| {
                (name == "SAMPLE_SERVER_PORT").then(|| "eighty".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref name, .. } if name == "SAMPLE_SERVER_PORT"));
    }

    #[test]
    fn explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader_in(dir.path())
            .with_file(Some(dir.path().join("absent.yaml")))
            .load_with::<Sample, _>(|_| None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn env_name_flattens_dotted_paths() {
        let loader = ConfigLoader::new("auth-bridge", "AUTH_BRIDGE");
        assert_eq!(loader.env_name("unkey.api_key"), "AUTH_BRIDGE_UNKEY_API_KEY");
        assert_eq!(loader.env_name("cache.redis.addr"), "AUTH_BRIDGE_CACHE_REDIS_ADDR");
    }
}
