pub mod client;
pub mod error;
pub mod model;
pub mod status;
mod wire;

pub use client::{REQUEST_ID_HEADER, UnkeyClient, UnkeyClientConfig};
pub use error::{ClientBuildError, VerifyError};
pub use model::{Identity, IdentityRateLimit, RateLimit, Verification};
pub use status::status_from_code;

use async_trait::async_trait;

/// Upstream key-management seam. The HTTP client implements it; tests
/// substitute in-memory verifiers.
#[async_trait]
pub trait KeyVerifier: Send + Sync {
    /// Returns the normalized record for both positive and negative verdicts.
    /// Only transport, protocol and deadline problems are errors.
    async fn verify_key(&self, key: &str) -> Result<Verification, VerifyError>;
}
