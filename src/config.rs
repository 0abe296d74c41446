//! Configuration types, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default poll interval: 5 minutes.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default invocation-level retry count for a failed tick.
const DEFAULT_TICK_RETRIES: u32 = 3;

/// Default mailbox search result cap per workflow per tick.
const DEFAULT_SEARCH_CAP: u32 = 50;

/// Poller scheduling configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Seconds between poll ticks.
    pub poll_interval_secs: u64,
    /// How many times a tick that failed outright (listing error, nothing
    /// per-item) is re-attempted before waiting for the next interval.
    pub tick_retries: u32,
    /// Maximum message ids returned per mailbox search.
    pub search_cap: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            tick_retries: DEFAULT_TICK_RETRIES,
            search_cap: DEFAULT_SEARCH_CAP,
        }
    }
}

impl PollerConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let poll_interval_secs = std::env::var("INGEST_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let tick_retries = std::env::var("INGEST_TICK_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TICK_RETRIES);

        let search_cap = std::env::var("INGEST_SEARCH_CAP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SEARCH_CAP);

        Self {
            poll_interval_secs,
            tick_retries,
            search_cap,
        }
    }
}

/// OAuth client configuration for the mailbox provider token endpoint.
#[derive(Debug, Clone)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_url: String,
}

impl OauthConfig {
    /// Build config from environment variables.
    ///
    /// `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET` are required;
    /// `GOOGLE_TOKEN_URL` defaults to the public Google endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID".into()))?;

        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_CLIENT_SECRET".into()))?;

        let token_url = std::env::var("GOOGLE_TOKEN_URL")
            .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string());

        Ok(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            token_url,
        })
    }
}

/// AI analysis endpoint configuration.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub endpoint_url: String,
}

impl AnalysisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint_url = std::env::var("ANALYSIS_ENDPOINT_URL")
            .map_err(|_| ConfigError::MissingEnvVar("ANALYSIS_ENDPOINT_URL".into()))?;
        Ok(Self { endpoint_url })
    }
}
