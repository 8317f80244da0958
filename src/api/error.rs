use super::config::ConfigError;

/// Errors from tax-authority API calls.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Transport failure before a response arrived.
    #[error("HTTP error calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The call did not complete within the configured timeout.
    #[error("request to {endpoint} timed out after {timeout_secs}s")]
    Timeout { endpoint: String, timeout_secs: u64 },

    /// Non-success HTTP status without a usable validation report.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The platform answered but refused the invoice or request.
    #[error("{endpoint} rejected the submission ({status}): {}", .messages.join("; "))]
    Rejected {
        endpoint: String,
        status: u16,
        messages: Vec<String>,
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        body: String,
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ApiError {
    /// HTTP status, when the platform responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
