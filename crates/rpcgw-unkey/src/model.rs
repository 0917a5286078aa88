use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VerifyError;

const ORGANIZATION_KEY: &str = "organizationId";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRateLimit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub auto_apply: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<IdentityRateLimit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
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

/// Canonical verification record handed to the gateway and stored in the
/// cache. Built once from an upstream response, normalized, then never
/// mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    /// Upstream code, verbatim. Empty means `VALID`.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub api_id: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    /// Legacy wrapper: `{"ratelimits": rate_limits}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

impl Verification {
    /// Flattens identity and metadata onto the record.
    ///
    /// `owner_id` falls back identity.id -> identity.external_id -> key_id.
    /// `meta.organizationId` takes precedence over the identity's.
    pub fn normalize(&mut self) {
        if let Some(identity) = self.identity.as_ref() {
            if self.owner_id.is_empty() {
                self.owner_id = if identity.id.is_empty() {
                    identity.external_id.clone()
                } else {
                    identity.id.clone()
                };
            }
            if self.organization_id.is_empty()
                && let Some(org) = identity.meta.as_ref().and_then(|meta| meta_str(meta, ORGANIZATION_KEY))
            {
                self.organization_id = org.to_string();
            }
        }

        if let Some(org) = meta_str(&self.meta, ORGANIZATION_KEY) {
            self.organization_id = org.to_string();
        }
        if let Some(plan) = meta_str(&self.meta, "plan") {
            self.plan = plan.to_string();
        }
        if let Some(api_id) = meta_str(&self.meta, "apiId") {
            self.api_id = api_id.to_string();
        }
        if let Some(workspace_id) = meta_str(&self.meta, "workspaceId") {
            self.workspace_id = workspace_id.to_string();
        }
        if let Some(project_id) = meta_str(&self.meta, "projectId") {
            self.project_id = project_id.to_string();
        }

        if self.owner_id.is_empty() {
            self.owner_id = self.key_id.clone();
        }

        if self.rate_limit.is_none() && !self.rate_limits.is_empty() {
            let mut wrapper = Map::new();
            wrapper.insert(
                "ratelimits".to_string(),
                serde_json::to_value(&self.rate_limits).unwrap_or(Value::Null),
            );
            self.rate_limit = Some(wrapper);
        }
    }

    /// A valid record must name its organization.
    pub fn require_organization(self) -> Result<Self, VerifyError> {
        if self.valid && self.organization_id.is_empty() {
            return Err(VerifyError::MissingOrganization(Box::new(self)));
        }
        Ok(self)
    }

    pub fn request_id(&self) -> Option<&str> {
        Some(self.request_id.as_str()).filter(|id| !id.is_empty())
    }
}

fn meta_str<'a>(meta: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    meta.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}
