//! Unified `Database` trait — single async interface for all persistence.
//!
//! Workflows and credentials are written by out-of-scope components and
//! consumed read-only here (seeding helpers exist for tests and tooling).
//! Conversations and analysis requests are owned by this pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::error::StoreError;

/// Lifecycle status of an interview workflow.
///
/// Mutated only by out-of-scope scheduling logic; this pipeline reads it
/// to decide polling eligibility (`!= Completed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    /// Created, no outreach yet.
    Scheduling,
    /// Outreach sent, waiting on a participant reply.
    AwaitingReply,
    /// Interview slot agreed.
    Scheduled,
    /// Terminal; excluded from polling.
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::AwaitingReply => "awaiting_reply",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
        }
    }

    /// Lenient parse — unknown strings fall back to `Scheduling` so a
    /// status written by a newer scheduler version still polls.
    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_reply" => Self::AwaitingReply,
            "scheduled" => Self::Scheduled,
            "completed" => Self::Completed,
            _ => Self::Scheduling,
        }
    }
}

/// One candidate/interviewer pairing being scheduled.
#[derive(Debug, Clone)]
pub struct InterviewWorkflow {
    pub id: String,
    /// Owning recruiter identity — keys the mailbox credential.
    pub recruiter_id: String,
    pub candidate_email: String,
    pub interviewer_email: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

impl InterviewWorkflow {
    /// The two participant addresses the mailbox search filters on.
    pub fn participants(&self) -> [&str; 2] {
        [&self.candidate_email, &self.interviewer_email]
    }
}

/// One refreshable mailbox credential per recruiter.
///
/// The cached access token is a hint only — the resolver always performs a
/// live refresh because the token's remaining lifetime is unknown here.
#[derive(Clone)]
pub struct MailboxCredential {
    pub recruiter_id: String,
    pub refresh_secret: SecretString,
    pub cached_access_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for MailboxCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxCredential")
            .field("recruiter_id", &self.recruiter_id)
            .field("refresh_secret", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Processing state of a conversation record.
///
/// "Unseen" has no variant — it is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Record exists, AI analysis not yet confirmed.
    Pending,
    /// AI analysis confirmed complete. Terminal.
    Processed,
}

/// Durable record of one inbound email message, keyed by provider
/// message id. The unit of idempotency for the whole pipeline.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub id: String,
    pub workflow_id: String,
    /// Provider message id — unique across all records.
    pub message_id: String,
    /// To header, verbatim.
    pub recipient: String,
    /// From header, normalized to the bare address.
    pub sender: String,
    pub subject: String,
    /// Reply-chain-stripped body text.
    pub content: String,
    pub state: ProcessState,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a conversation record. State is always `Pending`
/// at creation.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub workflow_id: String,
    pub message_id: String,
    pub recipient: String,
    pub sender: String,
    pub subject: String,
    pub content: String,
}

/// Append-only audit record, one per dispatch attempt.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: String,
    pub conversation_id: String,
    pub workflow_id: String,
    pub message_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering workflows, credentials,
/// conversations, and the analysis audit log.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Workflows (read-only to the pipeline) ───────────────────────

    /// All workflows eligible for polling: `status != completed`.
    /// An empty result is a normal, silent outcome.
    async fn list_active_workflows(&self) -> Result<Vec<InterviewWorkflow>, StoreError>;

    /// Seed a workflow. Used by tests and provisioning tools, never by
    /// the poller.
    async fn insert_workflow(&self, workflow: &InterviewWorkflow) -> Result<(), StoreError>;

    // ── Mailbox credentials ─────────────────────────────────────────

    /// Look up the credential owned by a recruiter.
    async fn get_mailbox_credential(
        &self,
        recruiter_id: &str,
    ) -> Result<Option<MailboxCredential>, StoreError>;

    /// Write back a freshly minted access token (cache only).
    async fn cache_access_token(
        &self,
        recruiter_id: &str,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Seed a credential. Used by tests and the out-of-scope consent flow.
    async fn insert_mailbox_credential(
        &self,
        credential: &MailboxCredential,
    ) -> Result<(), StoreError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Look up a conversation by provider message id. Zero or one rows
    /// are the only legal outcomes; the unique index enforces that.
    async fn find_conversation_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError>;

    /// Create a conversation in state `Pending`.
    ///
    /// A duplicate message id surfaces as `StoreError::Constraint`.
    async fn insert_conversation(
        &self,
        fields: NewConversation,
    ) -> Result<ConversationRecord, StoreError>;

    /// Transition a conversation to `Processed`. Idempotent — marking an
    /// already-processed record is a no-op.
    async fn mark_conversation_processed(&self, conversation_id: &str) -> Result<(), StoreError>;

    // ── Analysis audit log ──────────────────────────────────────────

    /// Append a dispatch-attempt audit row. Returns the generated id.
    /// Rows are never updated by this pipeline.
    async fn insert_analysis_request(
        &self,
        conversation_id: &str,
        workflow_id: &str,
        message_id: &str,
    ) -> Result<String, StoreError>;

    /// All audit rows for a conversation, oldest first.
    async fn list_analysis_requests(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<AnalysisRequest>, StoreError>;
}
