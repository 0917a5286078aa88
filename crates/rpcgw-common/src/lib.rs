pub mod access_log;
pub mod config;
pub mod error;
pub mod serve;
pub mod telemetry;

pub use access_log::log_requests;
pub use config::{ConfigError, ConfigLoader, duration_secs};
pub use error::{ErrorBody, error_response};
pub use serve::{ServeOptions, serve_until_signal, shutdown_signal};
pub use telemetry::{LogFormat, LoggingConfig, init_tracing};
