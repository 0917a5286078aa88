//! Upstream `v2/keys.verifyKey` wire shapes (camelCase JSON).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Identity, IdentityRateLimit, RateLimit, Verification};

#[derive(Debug, Serialize)]
pub(crate) struct VerifyKeyRequest<'a> {
    pub key: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResponseMeta {
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyKeyResponse {
    #[serde(default)]
    pub meta: ResponseMeta,
    pub data: VerifyKeyData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub meta: ResponseMeta,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorDetail {
    pub fn message(&self) -> Option<String> {
        self.detail
            .as_deref()
            .or(self.title.as_deref())
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyKeyData {
    pub valid: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub credits: Option<i64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub identity: Option<WireIdentity>,
    #[serde(default)]
    pub ratelimits: Option<Vec<WireRateLimit>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireIdentity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
    #[serde(default)]
    pub ratelimits: Option<Vec<WireIdentityRateLimit>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireIdentityRateLimit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub auto_apply: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireRateLimit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub reset: i64,
    #[serde(default)]
    pub remaining: i64,
    #[serde(default)]
    pub exceeded: bool,
    #[serde(default)]
    pub auto_apply: bool,
}

impl VerifyKeyData {
    /// Raw record, not yet normalized.
    pub fn into_verification(self) -> Verification {
        Verification {
            valid: self.valid,
            code: self.code.unwrap_or_default(),
            key_id: self.key_id.unwrap_or_default(),
            key_name: self.name.unwrap_or_default(),
            meta: self.meta.unwrap_or_default(),
            permissions: self.permissions.unwrap_or_default(),
            roles: self.roles.unwrap_or_default(),
            credits: self.credits,
            enabled: self.enabled,
            expires: self.expires,
            rate_limits: self
                .ratelimits
                .unwrap_or_default()
                .into_iter()
                .map(|rl| RateLimit {
                    id: rl.id.unwrap_or_default(),
                    name: rl.name.unwrap_or_default(),
                    limit: rl.limit,
                    duration: rl.duration,
                    reset: rl.reset,
                    remaining: rl.remaining,
                    exceeded: rl.exceeded,
                    auto_apply: rl.auto_apply,
                })
                .collect(),
            identity: self.identity.map(|identity| Identity {
                id: identity.id.unwrap_or_default(),
                external_id: identity.external_id.unwrap_or_default(),
                meta: identity.meta,
                rate_limits: identity
                    .ratelimits
                    .unwrap_or_default()
                    .into_iter()
                    .map(|rl| IdentityRateLimit {
                        id: rl.id.unwrap_or_default(),
                        name: rl.name.unwrap_or_default(),
                        limit: rl.limit,
                        duration: rl.duration,
                        auto_apply: rl.auto_apply,
                    })
                    .collect(),
            }),
            ..Verification::default()
        }
    }
}
