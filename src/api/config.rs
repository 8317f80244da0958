use url::Url;

use crate::core::Environment;

/// Connection settings for the tax-authority API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub environment: Environment,
    /// Base URL; endpoint paths are appended to it.
    pub base_url: Url,
    /// Upper bound for a single request, connect included.
    pub timeout_secs: u64,
    /// `Accept-Language` header value (`en` or `ar`).
    pub accept_language: String,
}

impl ApiConfig {
    /// Defaults for `environment`: its gateway URL, 30 s timeout, English.
    pub fn for_environment(environment: Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            environment,
            base_url: parse_url("base_url", environment.base_url())?,
            timeout_secs: 30,
            accept_language: "en".into(),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `FATOORA_ENVIRONMENT` (default: `development`)
    /// - `FATOORA_BASE_URL` (default: the environment's gateway URL)
    /// - `FATOORA_TIMEOUT_SECS` (default: 30)
    /// - `FATOORA_LANGUAGE` (default: `en`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match std::env::var("FATOORA_ENVIRONMENT") {
            Ok(name) => {
                Environment::from_name(&name).ok_or(ConfigError::UnknownEnvironment(name))?
            }
            Err(_) => Environment::Development,
        };
        let mut config = Self::for_environment(environment)?;

        if let Ok(raw) = std::env::var("FATOORA_BASE_URL") {
            config.base_url = parse_url("FATOORA_BASE_URL", &raw)?;
        }
        if let Ok(raw) = std::env::var("FATOORA_TIMEOUT_SECS") {
            config.timeout_secs = parse_timeout(&raw)?;
        }
        if let Ok(language) = std::env::var("FATOORA_LANGUAGE") {
            config.accept_language = language;
        }
        Ok(config)
    }

    /// Configuration pointing at a local mock server (for testing).
    pub fn local_mock(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::Development,
            base_url: parse_url("local mock", base_url)?,
            timeout_secs: 5,
            accept_language: "en".into(),
        })
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Full URL of `path` (which starts with `/`).
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

fn parse_url(source: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(source.to_string(), e.to_string()))
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidTimeout(raw.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown environment {0:?} (expected development, simulation or production)")]
    UnknownEnvironment(String),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid timeout {0:?}: expected a positive number of seconds")]
    InvalidTimeout(String),
    #[error("invalid Accept-Language value {0:?}")]
    InvalidLanguage(String),
}
