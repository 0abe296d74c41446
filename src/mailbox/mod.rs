//! Mailbox access — provider-agnostic client trait plus the Gmail REST
//! implementation and the pure content normalizer.

pub mod content;
pub mod gmail;

use async_trait::async_trait;

use crate::credentials::AccessCredential;
use crate::error::MailboxError;

pub use gmail::GmailClient;

/// One header from a fetched message.
#[derive(Debug, Clone)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// A fetched message: headers plus the decoded body.
///
/// The body is the top-level payload when the message is single-part, or
/// the first-level parts concatenated in order when it is multipart.
/// Nested multipart structures are not recursed into.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub headers: Vec<MessageHeader>,
    pub body: String,
}

impl RawMessage {
    /// Case-insensitive header lookup. First match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Thin capability over the provider's search/get operations,
/// parameterized by an access credential.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Find message ids from any of the given participant addresses.
    ///
    /// The result count is capped at `max_results` to bound per-tick
    /// latency and API cost. No matches is an empty list, not an error.
    async fn search(
        &self,
        credential: &AccessCredential,
        participants: &[&str],
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError>;

    /// Retrieve full message content by provider message id.
    async fn fetch(
        &self,
        credential: &AccessCredential,
        message_id: &str,
    ) -> Result<RawMessage, MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = RawMessage {
            id: "m1".into(),
            headers: vec![
                MessageHeader {
                    name: "From".into(),
                    value: "Jane Doe <jane@x.com>".into(),
                },
                MessageHeader {
                    name: "Subject".into(),
                    value: "Re: Interview".into(),
                },
            ],
            body: String::new(),
        };

        assert_eq!(msg.header("from"), Some("Jane Doe <jane@x.com>"));
        assert_eq!(msg.header("SUBJECT"), Some("Re: Interview"));
        assert_eq!(msg.header("To"), None);
    }
}
