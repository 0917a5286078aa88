use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use wreq::Client;

use crate::KeyVerifier;
use crate::error::{ClientBuildError, VerifyError};
use crate::model::Verification;
use crate::wire::{ErrorEnvelope, VerifyKeyRequest, VerifyKeyResponse};

pub const REQUEST_ID_HEADER: &str = "x-unkey-request-id";

const VERIFY_PATH: &str = "/v2/keys.verifyKey";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct UnkeyClientConfig {
    pub base_url: String,
    /// Root key used as the bearer credential against the upstream.
    pub api_key: String,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct UnkeyClient {
    client: Client,
    endpoint: String,
    root_key: String,
}

impl UnkeyClient {
    pub fn new(config: UnkeyClientConfig) -> Result<Self, ClientBuildError> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ClientBuildError::MissingBaseUrl);
        }
        if config.api_key.trim().is_empty() {
            return Err(ClientBuildError::MissingApiKey);
        }
        let timeout = if config.request_timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            config.request_timeout
        };

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{base_url}{VERIFY_PATH}"),
            root_key: config.api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl KeyVerifier for UnkeyClient {
    async fn verify_key(&self, key: &str) -> Result<Verification, VerifyError> {
        let body = serde_json::to_vec(&VerifyKeyRequest { key }).map_err(|err| {
            VerifyError::Decode {
                message: err.to_string(),
                request_id: None,
            }
        })?;

        let resp = self
            .client
            .post(self.endpoint.as_str())
            .header("authorization", format!("Bearer {}", self.root_key))
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_wreq_error)?;

        let status = resp.status().as_u16();
        let header_request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await.map_err(map_wreq_error)?;
        debug!(
            event = "unkey_verify_responded",
            status,
            body_len = bytes.len(),
            request_id = ?header_request_id
        );

        if !(200..300).contains(&status) {
            let envelope = serde_json::from_slice::<ErrorEnvelope>(&bytes).ok();
            let message = envelope
                .as_ref()
                .and_then(|envelope| envelope.error.as_ref())
                .and_then(|detail| detail.message())
                .unwrap_or_else(|| format!("upstream returned status {status}"));
            let request_id = envelope
                .and_then(|envelope| envelope.meta.request_id)
                .or(header_request_id);
            return Err(VerifyError::Upstream {
                status: Some(status),
                message,
                request_id,
            });
        }

        let parsed: VerifyKeyResponse =
            serde_json::from_slice(&bytes).map_err(|err| VerifyError::Decode {
                message: err.to_string(),
                request_id: header_request_id.clone(),
            })?;

        let mut verification = parsed.data.into_verification();
        verification.request_id = parsed
            .meta
            .request_id
            .filter(|id| !id.is_empty())
            .or(header_request_id)
            .unwrap_or_default();
        verification.normalize();
        Ok(verification)
    }
}

fn map_wreq_error(err: wreq::Error) -> VerifyError {
    if err.is_timeout() {
        return VerifyError::Timeout;
    }
    VerifyError::Upstream {
        status: None,
        message: err.to_string(),
        request_id: None,
    }
}
