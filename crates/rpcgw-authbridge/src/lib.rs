pub mod cache;
pub mod config;
pub mod handler;
pub mod router;

pub use cache::{Cache, CacheError, CacheStore, MemoryStore, RedisStore};
pub use config::{AuthBridgeConfig, CacheBackend, CacheConfig, RedisConfig, ServerConfig, UnkeyConfig};
pub use handler::{BridgeState, CACHE_WRITE_DEADLINE, REQUEST_DEADLINE};
pub use router::bridge_router;
