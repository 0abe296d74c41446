//! AI analysis dispatch — fire-and-confirm call to the analysis endpoint.
//!
//! Every attempt appends an audit row first, then posts the identifiers.
//! There is no in-call retry; a failed dispatch leaves the conversation
//! pending and the next tick retries it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::DispatchError;
use crate::store::Database;

/// Hands a conversation to the external AI analysis step.
#[async_trait]
pub trait AnalysisDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        conversation_id: &str,
        workflow_id: &str,
        message_id: &str,
    ) -> Result<(), DispatchError>;
}

/// Outbound request payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisPayload<'a> {
    conversation_id: &'a str,
    workflow_id: &'a str,
    message_id: &'a str,
}

/// HTTP dispatcher for the analysis endpoint.
pub struct HttpDispatcher {
    store: Arc<dyn Database>,
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl HttpDispatcher {
    pub fn new(store: Arc<dyn Database>, config: AnalysisConfig) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AnalysisDispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        conversation_id: &str,
        workflow_id: &str,
        message_id: &str,
    ) -> Result<(), DispatchError> {
        // Audit row first, one per attempt — the log records tries that
        // never reached the endpoint too.
        let request_id = self
            .store
            .insert_analysis_request(conversation_id, workflow_id, message_id)
            .await?;

        debug!(
            request_id = %request_id,
            conversation_id,
            "Dispatching conversation for analysis"
        );

        let payload = AnalysisPayload {
            conversation_id,
            workflow_id,
            message_id,
        };

        let response = self
            .http
            .post(&self.config.endpoint_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError::Rejected {
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}
