//! Persistence layer — libSQL-backed storage for workflows, credentials,
//! conversations, and the analysis audit log.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    AnalysisRequest, ConversationRecord, Database, InterviewWorkflow, MailboxCredential,
    NewConversation, ProcessState, WorkflowStatus,
};
