//! Gmail REST mailbox client.
//!
//! Uses `users/me/messages` list + get with `format=full`. The payload
//! JSON carries either a single body or first-level `parts`; both shapes
//! are handled, and nested multipart is deliberately not recursed into.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::warn;

use crate::credentials::AccessCredential;
use crate::error::MailboxError;
use crate::mailbox::{MailboxClient, MessageHeader, RawMessage};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// Gmail REST API client.
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
}

impl GmailClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a different base URL (test servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn check_status(status: reqwest::StatusCode, context: &str) -> Result<(), MailboxError> {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(MailboxError::Auth(format!("{context}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(MailboxError::Transport(format!("{context}: HTTP {status}")));
        }
        Ok(())
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxClient for GmailClient {
    async fn search(
        &self,
        credential: &AccessCredential,
        participants: &[&str],
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError> {
        let url = format!("{}/users/me/messages", self.base_url);
        let query = build_query(participants);
        let cap = max_results.to_string();

        let response = self
            .http
            .get(&url)
            .bearer_auth(credential.expose_token())
            .query(&[("q", query.as_str()), ("maxResults", cap.as_str())])
            .send()
            .await
            .map_err(|e| MailboxError::Transport(format!("search: {e}")))?;

        Self::check_status(response.status(), "search")?;

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::InvalidResponse {
                context: "search".into(),
                reason: e.to_string(),
            })?;

        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch(
        &self,
        credential: &AccessCredential,
        message_id: &str,
    ) -> Result<RawMessage, MailboxError> {
        let url = format!("{}/users/me/messages/{}", self.base_url, message_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(credential.expose_token())
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| MailboxError::Transport(format!("fetch {message_id}: {e}")))?;

        Self::check_status(response.status(), "fetch")?;

        let message: GetResponse =
            response
                .json()
                .await
                .map_err(|e| MailboxError::InvalidResponse {
                    context: format!("fetch {message_id}"),
                    reason: e.to_string(),
                })?;

        Ok(message_to_raw(message))
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    id: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<PayloadHeader>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<PayloadPart>,
}

#[derive(Debug, Deserialize)]
struct PayloadHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadPart {
    #[serde(default)]
    body: Option<PayloadBody>,
}

// ── Helpers (free functions for testing) ────────────────────────────

/// Disjunctive `from:` filter over the participant addresses.
fn build_query(participants: &[&str]) -> String {
    participants
        .iter()
        .map(|p| format!("from:{p}"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Decode a base64url body chunk. Undecodable data degrades to an empty
/// string rather than failing the message.
fn decode_body_data(data: &str) -> String {
    match URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(error = %e, "Undecodable message body data — treating as empty");
            String::new()
        }
    }
}

/// Flatten a Gmail payload into a `RawMessage`.
///
/// Single-part messages carry their data on the top-level body; multipart
/// messages carry it on first-level parts, concatenated in order.
fn message_to_raw(message: GetResponse) -> RawMessage {
    let headers = message
        .payload
        .headers
        .into_iter()
        .map(|h| MessageHeader {
            name: h.name,
            value: h.value,
        })
        .collect();

    let body = if message.payload.parts.is_empty() {
        message
            .payload
            .body
            .and_then(|b| b.data)
            .map(|data| decode_body_data(&data))
            .unwrap_or_default()
    } else {
        message
            .payload
            .parts
            .into_iter()
            .filter_map(|part| part.body.and_then(|b| b.data))
            .map(|data| decode_body_data(&data))
            .collect::<Vec<_>>()
            .join("")
    };

    RawMessage {
        id: message.id,
        headers,
        body,
    }
}
