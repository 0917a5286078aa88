use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use rpcgw_common::error_response;

const BEARER: &str = "Bearer ";

/// Static admin bearer token guarding `/api/v1/*`.
#[derive(Debug, Clone)]
pub struct AdminKey(Arc<str>);

impl AdminKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key.trim()))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum AuthFailure {
    Missing,
    Malformed,
    Mismatch,
}

impl AuthFailure {
    fn message(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "authorization header required",
            AuthFailure::Malformed => {
                "invalid authorization header format, expected: Bearer <token>"
            }
            AuthFailure::Mismatch => "invalid api key",
        }
    }
}

pub async fn admin_auth(
    State(expected): State<AdminKey>,
    req: Request,
    next: Next,
) -> Response {
    match check_bearer(req.headers(), &expected.0) {
        Ok(()) => next.run(req).await,
        Err(failure) => error_response(StatusCode::UNAUTHORIZED, failure.message()),
    }
}

fn check_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AuthFailure> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthFailure::Missing)?;
    if value.len() <= BEARER.len() || !value[..BEARER.len()].eq_ignore_ascii_case(BEARER) {
        return Err(AuthFailure::Malformed);
    }
    let token = value[BEARER.len()..].trim();
    if expected.is_empty() || token != expected {
        return Err(AuthFailure::Mismatch);
    }
    Ok(())
}
