use serde::Serialize;
use thiserror::Error;

/// Why a group access token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidGroupTokenReason {
    IncorrectToken,
    TokenName,
    IncorrectScopes,
}

impl std::fmt::Display for InvalidGroupTokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::IncorrectToken => "the token is invalid or expired",
            Self::TokenName => "no group access token with the given name",
            Self::IncorrectScopes => "the token is missing required scopes",
        };
        f.write_str(reason)
    }
}

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("GitLab request failed with status {status}: {status_text}")]
    GitlabHttpMethod { status: u16, status_text: String },

    #[error("Invalid group token: {0}")]
    InvalidGroupToken(InvalidGroupTokenReason),

    #[error("Invalid webhook secret")]
    ValidateWebhookSignature,

    #[error("Invalid event format: {0}")]
    ParseWebhookEventPayload(String),

    #[error(transparent)]
    InvalidAri(#[from] crate::cac::ari::InvalidAriError),

    #[error("{0}")]
    Aggregate(String),

    #[error("Compass request failed: {0}")]
    Compass(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntegrationError {
    /// HTTP status an entry point should answer with. GitLab statuses pass through.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::GitlabHttpMethod { status, .. } => *status,
            Self::InvalidGroupToken(_) | Self::InvalidAri(_) => 400,
            Self::ParseWebhookEventPayload(_) => 400,
            Self::ValidateWebhookSignature => 403,
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Machine-readable error type surfaced to resolver callers.
    pub fn error_type(&self) -> Option<String> {
        match self {
            Self::InvalidGroupToken(reason) => serde_json::to_value(reason)
                .ok()
                .and_then(|v| v.as_str().map(ToString::to_string)),
            Self::GitlabHttpMethod { .. } => Some("GITLAB_REQUEST_FAILED".to_string()),
            Self::NotFound(_) => Some("NOT_FOUND".to_string()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::GitlabHttpMethod { status: 404, .. } | Self::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IntegrationError>;
