use crate::model::Verification;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("upstream verification timeout")]
    Timeout,
    #[error("organizationId missing from key metadata")]
    MissingOrganization(Box<Verification>),
    #[error("unkey verify request failed: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        request_id: Option<String>,
    },
    #[error("unkey verify response invalid: {message}")]
    Decode {
        message: String,
        request_id: Option<String>,
    },
}

impl VerifyError {
    /// Upstream correlation id carried by the partial response, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            VerifyError::Timeout => None,
            VerifyError::MissingOrganization(verification) => verification.request_id(),
            VerifyError::Upstream { request_id, .. } | VerifyError::Decode { request_id, .. } => {
                request_id.as_deref().filter(|id| !id.is_empty())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("unkey base url is required")]
    MissingBaseUrl,
    #[error("unkey api key is required")]
    MissingApiKey,
    #[error("failed to build http client: {0}")]
    Http(#[from] wreq::Error),
}
