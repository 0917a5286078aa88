use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use rpcgw_common::{ErrorBody, error_response};
use rpcgw_unkey::{KeyVerifier, REQUEST_ID_HEADER, Verification, VerifyError, status_from_code};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheError};

/// Hard ceiling on cache lookup plus upstream verification.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(3);
/// Budget for the detached post-success cache write.
pub const CACHE_WRITE_DEADLINE: Duration = Duration::from_secs(1);

const TIMEOUT_MESSAGE: &str = "upstream verification timeout";

#[derive(Clone)]
pub struct BridgeState {
    pub verifier: Arc<dyn KeyVerifier>,
    pub cache: Cache,
    pub request_deadline: Duration,
    pub cache_write_deadline: Duration,
}

impl BridgeState {
    pub fn new(verifier: Arc<dyn KeyVerifier>, cache: Cache) -> Self {
        Self {
            verifier,
            cache,
            request_deadline: REQUEST_DEADLINE,
            cache_write_deadline: CACHE_WRITE_DEADLINE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

impl VerifyRequest {
    /// `api_key` wins; an empty `api_key` falls through to `key`.
    fn into_key(self) -> Option<String> {
        self.api_key
            .filter(|key| !key.is_empty())
            .or(self.key.filter(|key| !key.is_empty()))
    }
}

enum Outcome {
    Cached(Bytes, Verification),
    Verified(Verification),
    Failed(VerifyError),
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

pub async fn verify(State(state): State<BridgeState>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<VerifyRequest>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid request payload");
    };
    let Some(key) = request.into_key() else {
        return error_response(StatusCode::BAD_REQUEST, "api_key is required");
    };

    let started_at = Instant::now();
    let cache_key = Cache::hash(&key);
    let fingerprint = &cache_key[..12];

    let outcome = match tokio::time::timeout(
        state.request_deadline,
        resolve(&state, &key, &cache_key),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Failed(VerifyError::Timeout),
    };

    match outcome {
        Outcome::Cached(bytes, verification) => {
            let status = verdict_status(&verification);
            info!(
                event = "verify_cache_hit",
                key_fp = %fingerprint,
                status = status.as_u16(),
                elapsed_ms = started_at.elapsed().as_millis()
            );
            json_bytes(status, bytes, verification.request_id())
        }
        Outcome::Failed(err) => {
            let status = match &err {
                VerifyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                VerifyError::MissingOrganization(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(
                event = "verify_failed",
                key_fp = %fingerprint,
                status = status.as_u16(),
                error = %err,
                elapsed_ms = started_at.elapsed().as_millis()
            );
            let request_id = err.request_id();
            let message = match err {
                VerifyError::Timeout => TIMEOUT_MESSAGE.to_string(),
                other => other.to_string(),
            };
            let mut response = ErrorBody::new(message)
                .with_request_id(request_id)
                .into_response(status);
            set_request_id(&mut response, request_id);
            response
        }
        Outcome::Verified(verification) => {
            let status = verdict_status(&verification);
            let bytes = match serde_json::to_vec(&verification) {
                Ok(bytes) => Bytes::from(bytes),
                Err(err) => {
                    warn!(event = "verify_encode_failed", error = %err);
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
                }
            };
            if verification.valid {
                store_detached(&state, cache_key.clone(), bytes.clone()).await;
            }
            info!(
                event = "verify_responded",
                key_fp = %fingerprint,
                valid = verification.valid,
                code = %verification.code,
                status = status.as_u16(),
                elapsed_ms = started_at.elapsed().as_millis()
            );
            json_bytes(status, bytes, verification.request_id())
        }
    }
}

/// Cache lookup then upstream verification; runs under the request deadline.
async fn resolve(state: &BridgeState, key: &str, cache_key: &str) -> Outcome {
    match state.cache.get(cache_key).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<Verification>(&bytes) {
            Ok(cached) => match cached.require_organization() {
                Ok(cached) => return Outcome::Cached(bytes, cached),
                Err(err) => debug!(event = "verify_cache_corrupt", error = %err),
            },
            Err(err) => debug!(event = "verify_cache_corrupt", error = %err),
        },
        Ok(None) => {}
        Err(err) => warn!(event = "verify_cache_get_failed", error = %err),
    }

    let verification = match state.verifier.verify_key(key).await {
        Ok(mut verification) => {
            verification.normalize();
            verification
        }
        Err(err) => return Outcome::Failed(err),
    };
    match verification.require_organization() {
        Ok(verification) => Outcome::Verified(verification),
        Err(err) => Outcome::Failed(err),
    }
}

/// Writes on its own task so dropping the request future cannot cancel it.
async fn store_detached(state: &BridgeState, cache_key: String, bytes: Bytes) {
    if !state.cache.enabled() {
        return;
    }
    let cache = state.cache.clone();
    let deadline = state.cache_write_deadline;
    let task = tokio::spawn(async move {
        match tokio::time::timeout(deadline, cache.set(&cache_key, bytes)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    });
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(event = "verify_cache_set_failed", error = %err),
        Err(err) => warn!(event = "verify_cache_set_failed", error = %err),
    }
}

/// OK for valid records; otherwise the mapped code, never 200.
fn verdict_status(verification: &Verification) -> StatusCode {
    if verification.valid {
        return StatusCode::OK;
    }
    match status_from_code(&verification.code) {
        StatusCode::OK => StatusCode::UNAUTHORIZED,
        status => status,
    }
}

fn json_bytes(status: StatusCode, bytes: Bytes, request_id: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    set_request_id(&mut response, request_id);
    response
}

fn set_request_id(response: &mut Response, request_id: Option<&str>) {
    if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_wins_over_key() {
        let request: VerifyRequest =
            serde_json::from_str(r#"{"api_key":"a","key":"b"}"#).unwrap();
        assert_eq!(request.into_key().as_deref(), Some("a"));

        let request: VerifyRequest = serde_json::from_str(r#"{"api_key":"","key":"b"}"#).unwrap();
        assert_eq!(request.into_key().as_deref(), Some("b"));

        let request: VerifyRequest = serde_json::from_str(r#"{"key":null}"#).unwrap();
        assert_eq!(request.into_key(), None);
    }

    #[test]
    fn negative_verdicts_never_answer_ok() {
        let mut verification = Verification {
            valid: false,
            ..Verification::default()
        };
        assert_eq!(verdict_status(&verification), StatusCode::UNAUTHORIZED);

        verification.code = "INSUFFICIENT_CREDITS".to_string();
        assert_eq!(verdict_status(&verification), StatusCode::PAYMENT_REQUIRED);

        verification.valid = true;
        assert_eq!(verdict_status(&verification), StatusCode::OK);
    }
}
