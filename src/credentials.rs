//! Credential resolution — live OAuth token refresh per tick.
//!
//! The stored access token is only a cache with an unknown remaining
//! lifetime, so the resolver always exchanges the refresh secret for a
//! fresh token instead of trusting it.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use crate::config::OauthConfig;
use crate::error::CredentialError;
use crate::store::Database;

/// A short-lived, ready-to-use mailbox access token.
#[derive(Clone)]
pub struct AccessCredential {
    token: SecretString,
}

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }

    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Resolves a refreshable access credential for a recruiter's mailbox.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, recruiter_id: &str) -> Result<AccessCredential, CredentialError>;
}

/// Google token-endpoint resolver backed by stored refresh secrets.
pub struct GoogleTokenResolver {
    store: Arc<dyn Database>,
    http: reqwest::Client,
    config: OauthConfig,
}

impl GoogleTokenResolver {
    pub fn new(store: Arc<dyn Database>, config: OauthConfig) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            config,
        }
    }
}

/// Token endpoint response body (the fields we read).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl CredentialResolver for GoogleTokenResolver {
    async fn resolve(&self, recruiter_id: &str) -> Result<AccessCredential, CredentialError> {
        let credential = self
            .store
            .get_mailbox_credential(recruiter_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound {
                recruiter_id: recruiter_id.to_string(),
            })?;

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("refresh_token", credential.refresh_secret.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CredentialError::Refresh {
                recruiter_id: recruiter_id.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CredentialError::Refresh {
                recruiter_id: recruiter_id.to_string(),
                reason: format!("token endpoint returned HTTP {}", response.status()),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| CredentialError::Refresh {
                    recruiter_id: recruiter_id.to_string(),
                    reason: format!("malformed token response: {e}"),
                })?;

        // Cache write-back is best effort — the fresh token is already in
        // hand, so a failed write only costs the next reader a refresh.
        let expires_at = token
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));
        if let Err(e) = self
            .store
            .cache_access_token(recruiter_id, &token.access_token, expires_at)
            .await
        {
            warn!(recruiter_id, error = %e, "Failed to cache refreshed access token");
        }

        Ok(AccessCredential::new(token.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    fn test_config() -> OauthConfig {
        OauthConfig {
            client_id: "client".into(),
            client_secret: SecretString::from("secret"),
            // Never reached — the store lookup fails first.
            token_url: "http://127.0.0.1:1/token".into(),
        }
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let resolver = GoogleTokenResolver::new(store, test_config());

        let err = resolver.resolve("nobody").await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { .. }), "got {err:?}");
    }

    #[test]
    fn access_credential_debug_redacts_token() {
        let cred = AccessCredential::new("ya29.secret-token");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("secret-token"));
    }
}
