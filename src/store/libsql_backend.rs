//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{
    AnalysisRequest, ConversationRecord, Database, InterviewWorkflow, MailboxCredential,
    NewConversation, ProcessState, WorkflowStatus,
};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a query error, promoting unique-index failures to `Constraint`.
fn map_write_err(e: libsql::Error) -> StoreError {
    let text = e.to_string();
    if text.contains("UNIQUE") {
        StoreError::Constraint(text)
    } else {
        StoreError::Query(text)
    }
}

/// Map a libsql Row to an InterviewWorkflow.
///
/// Column order: 0:id, 1:recruiter_id, 2:candidate_email,
/// 3:interviewer_email, 4:status, 5:created_at
fn row_to_workflow(row: &libsql::Row) -> Result<InterviewWorkflow, libsql::Error> {
    let id: String = row.get(0)?;
    let recruiter_id: String = row.get(1)?;
    let candidate_email: String = row.get(2)?;
    let interviewer_email: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(InterviewWorkflow {
        id,
        recruiter_id,
        candidate_email,
        interviewer_email,
        status: WorkflowStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a ConversationRecord.
///
/// Column order: 0:id, 1:workflow_id, 2:message_id, 3:recipient,
/// 4:sender, 5:subject, 6:content, 7:processed, 8:created_at
fn row_to_conversation(row: &libsql::Row) -> Result<ConversationRecord, libsql::Error> {
    let id: String = row.get(0)?;
    let workflow_id: String = row.get(1)?;
    let message_id: String = row.get(2)?;
    let recipient: String = row.get(3)?;
    let sender: String = row.get(4)?;
    let subject: String = row.get(5)?;
    let content: String = row.get(6)?;
    let processed: i64 = row.get(7)?;
    let created_str: String = row.get(8)?;

    Ok(ConversationRecord {
        id,
        workflow_id,
        message_id,
        recipient,
        sender,
        subject,
        content,
        state: if processed != 0 {
            ProcessState::Processed
        } else {
            ProcessState::Pending
        },
        created_at: parse_datetime(&created_str),
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, workflow_id, message_id, recipient, sender, subject, content, processed, created_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Workflows ───────────────────────────────────────────────────

    async fn list_active_workflows(&self) -> Result<Vec<InterviewWorkflow>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, recruiter_id, candidate_email, interviewer_email, status, created_at
                 FROM workflows WHERE status != 'completed' ORDER BY created_at",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to list workflows: {e}")))?;

        let mut workflows = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read workflow row: {e}")))?
        {
            workflows.push(
                row_to_workflow(&row)
                    .map_err(|e| StoreError::Query(format!("Failed to map workflow row: {e}")))?,
            );
        }
        Ok(workflows)
    }

    async fn insert_workflow(&self, workflow: &InterviewWorkflow) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO workflows
                 (id, recruiter_id, candidate_email, interviewer_email, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    workflow.id.clone(),
                    workflow.recruiter_id.clone(),
                    workflow.candidate_email.clone(),
                    workflow.interviewer_email.clone(),
                    workflow.status.as_str(),
                    workflow.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_write_err)?;
        Ok(())
    }

    // ── Mailbox credentials ─────────────────────────────────────────

    async fn get_mailbox_credential(
        &self,
        recruiter_id: &str,
    ) -> Result<Option<MailboxCredential>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT recruiter_id, refresh_secret, access_token, expires_at
                 FROM mailbox_credentials WHERE recruiter_id = ?1",
                params![recruiter_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query credential: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read credential row: {e}")))?
        else {
            return Ok(None);
        };

        let recruiter_id: String = row
            .get(0)
            .map_err(|e| StoreError::Query(format!("Failed to map credential row: {e}")))?;
        let refresh_secret: String = row
            .get(1)
            .map_err(|e| StoreError::Query(format!("Failed to map credential row: {e}")))?;
        let access_token: Option<String> = row.get(2).ok();
        let expires_str: Option<String> = row.get(3).ok();

        Ok(Some(MailboxCredential {
            recruiter_id,
            refresh_secret: SecretString::from(refresh_secret),
            cached_access_token: access_token.map(SecretString::from),
            expires_at: expires_str.as_deref().map(parse_datetime),
        }))
    }

    async fn cache_access_token(
        &self,
        recruiter_id: &str,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE mailbox_credentials
                 SET access_token = ?2, expires_at = ?3, updated_at = ?4
                 WHERE recruiter_id = ?1",
                params![
                    recruiter_id,
                    access_token,
                    expires_at.map(|dt| dt.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(map_write_err)?;
        Ok(())
    }

    async fn insert_mailbox_credential(
        &self,
        credential: &MailboxCredential,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO mailbox_credentials
                 (recruiter_id, refresh_secret, access_token, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    credential.recruiter_id.clone(),
                    credential.refresh_secret.expose_secret(),
                    credential
                        .cached_access_token
                        .as_ref()
                        .map(|t| t.expose_secret().to_string()),
                    credential.expires_at.map(|dt| dt.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(map_write_err)?;
        Ok(())
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn find_conversation_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE message_id = ?1"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![message_id])
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query conversation: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read conversation row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_conversation(&row).map_err(|e| {
                StoreError::Query(format!("Failed to map conversation row: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    async fn insert_conversation(
        &self,
        fields: NewConversation,
    ) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord {
            id: Uuid::new_v4().to_string(),
            workflow_id: fields.workflow_id,
            message_id: fields.message_id,
            recipient: fields.recipient,
            sender: fields.sender,
            subject: fields.subject,
            content: fields.content,
            state: ProcessState::Pending,
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO conversations
                 (id, workflow_id, message_id, recipient, sender, subject, content, processed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    record.id.clone(),
                    record.workflow_id.clone(),
                    record.message_id.clone(),
                    record.recipient.clone(),
                    record.sender.clone(),
                    record.subject.clone(),
                    record.content.clone(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(map_write_err)?;

        Ok(record)
    }

    async fn mark_conversation_processed(&self, conversation_id: &str) -> Result<(), StoreError> {
        // Idempotent: re-marking a processed row matches zero or one rows
        // and writes the same value either way.
        self.conn()
            .execute(
                "UPDATE conversations SET processed = 1 WHERE id = ?1",
                params![conversation_id],
            )
            .await
            .map_err(map_write_err)?;
        Ok(())
    }

    // ── Analysis audit log ──────────────────────────────────────────

    async fn insert_analysis_request(
        &self,
        conversation_id: &str,
        workflow_id: &str,
        message_id: &str,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO analysis_requests
                 (id, conversation_id, workflow_id, message_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                params![
                    id.clone(),
                    conversation_id,
                    workflow_id,
                    message_id,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(map_write_err)?;
        Ok(id)
    }

    async fn list_analysis_requests(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<AnalysisRequest>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, conversation_id, workflow_id, message_id, status, created_at
                 FROM analysis_requests WHERE conversation_id = ?1 ORDER BY created_at",
                params![conversation_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query analysis requests: {e}")))?;

        let mut requests = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read analysis row: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("Failed to map analysis row: {e}")))?;
            let conversation_id: String = row
                .get(1)
                .map_err(|e| StoreError::Query(format!("Failed to map analysis row: {e}")))?;
            let workflow_id: String = row
                .get(2)
                .map_err(|e| StoreError::Query(format!("Failed to map analysis row: {e}")))?;
            let message_id: String = row
                .get(3)
                .map_err(|e| StoreError::Query(format!("Failed to map analysis row: {e}")))?;
            let status: String = row
                .get(4)
                .map_err(|e| StoreError::Query(format!("Failed to map analysis row: {e}")))?;
            let created_str: String = row
                .get(5)
                .map_err(|e| StoreError::Query(format!("Failed to map analysis row: {e}")))?;

            requests.push(AnalysisRequest {
                id,
                conversation_id,
                workflow_id,
                message_id,
                status,
                created_at: parse_datetime(&created_str),
            });
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_workflow(id: &str, status: WorkflowStatus) -> InterviewWorkflow {
        InterviewWorkflow {
            id: id.to_string(),
            recruiter_id: "recruiter-1".to_string(),
            candidate_email: "candidate@example.com".to_string(),
            interviewer_email: "interviewer@example.com".to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    fn test_conversation_fields(message_id: &str) -> NewConversation {
        NewConversation {
            workflow_id: "wf-1".to_string(),
            message_id: message_id.to_string(),
            recipient: "recruiter@example.com".to_string(),
            sender: "candidate@example.com".to_string(),
            subject: "Re: Interview".to_string(),
            content: "Tuesday works for me".to_string(),
        }
    }

    #[tokio::test]
    async fn active_workflows_excludes_completed() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        db.insert_workflow(&test_workflow("wf-1", WorkflowStatus::Scheduling))
            .await
            .unwrap();
        db.insert_workflow(&test_workflow("wf-2", WorkflowStatus::AwaitingReply))
            .await
            .unwrap();
        db.insert_workflow(&test_workflow("wf-3", WorkflowStatus::Scheduled))
            .await
            .unwrap();
        db.insert_workflow(&test_workflow("wf-4", WorkflowStatus::Completed))
            .await
            .unwrap();

        let active = db.list_active_workflows().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"wf-4"));
    }

    #[tokio::test]
    async fn conversation_create_find_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        assert!(db
            .find_conversation_by_message_id("msg-1")
            .await
            .unwrap()
            .is_none());

        let record = db
            .insert_conversation(test_conversation_fields("msg-1"))
            .await
            .unwrap();
        assert_eq!(record.state, ProcessState::Pending);

        let found = db
            .find_conversation_by_message_id("msg-1")
            .await
            .unwrap()
            .expect("record should exist");
        assert_eq!(found.id, record.id);
        assert_eq!(found.sender, "candidate@example.com");
        assert_eq!(found.state, ProcessState::Pending);
    }

    #[tokio::test]
    async fn duplicate_message_id_is_constraint_violation() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        db.insert_conversation(test_conversation_fields("msg-1"))
            .await
            .unwrap();

        let err = db
            .insert_conversation(test_conversation_fields("msg-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn mark_processed_is_idempotent() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        let record = db
            .insert_conversation(test_conversation_fields("msg-1"))
            .await
            .unwrap();

        db.mark_conversation_processed(&record.id).await.unwrap();
        db.mark_conversation_processed(&record.id).await.unwrap();

        let found = db
            .find_conversation_by_message_id("msg-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.state, ProcessState::Processed);
    }

    #[tokio::test]
    async fn credential_roundtrip_and_token_cache() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        db.insert_mailbox_credential(&MailboxCredential {
            recruiter_id: "recruiter-1".to_string(),
            refresh_secret: SecretString::from("refresh-secret"),
            cached_access_token: None,
            expires_at: None,
        })
        .await
        .unwrap();

        let cred = db
            .get_mailbox_credential("recruiter-1")
            .await
            .unwrap()
            .expect("credential should exist");
        assert_eq!(cred.refresh_secret.expose_secret(), "refresh-secret");
        assert!(cred.cached_access_token.is_none());

        db.cache_access_token("recruiter-1", "ya29.fresh", Some(Utc::now()))
            .await
            .unwrap();

        let cred = db
            .get_mailbox_credential("recruiter-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            cred.cached_access_token.unwrap().expose_secret(),
            "ya29.fresh"
        );
        assert!(cred.expires_at.is_some());
    }

    #[tokio::test]
    async fn missing_credential_returns_none() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db
            .get_mailbox_credential("nobody")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn analysis_requests_append_only() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        db.insert_analysis_request("conv-1", "wf-1", "msg-1")
            .await
            .unwrap();
        db.insert_analysis_request("conv-1", "wf-1", "msg-1")
            .await
            .unwrap();

        let requests = db.list_analysis_requests("conv-1").await.unwrap();
        assert_eq!(requests.len(), 2, "each attempt gets its own row");
        assert!(requests.iter().all(|r| r.status == "pending"));
    }

    #[tokio::test]
    async fn local_file_backend_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ingest.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_conversation(test_conversation_fields("msg-1"))
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db
            .find_conversation_by_message_id("msg-1")
            .await
            .unwrap()
            .is_some());
    }
}
