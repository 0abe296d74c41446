//! Error types for the ingestion pipeline.

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Credential resolution errors.
///
/// Any of these causes the owning workflow to be skipped for the tick;
/// none of them abort the tick itself.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No mailbox credential stored for {recruiter_id}")]
    NotFound { recruiter_id: String },

    #[error("Token refresh failed for {recruiter_id}: {reason}")]
    Refresh { recruiter_id: String, reason: String },

    #[error("Store error during credential lookup: {0}")]
    Store(#[from] StoreError),
}

/// Mailbox provider errors. All variants are retryable on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox request failed: {0}")]
    Transport(String),

    #[error("Mailbox rejected credential: {0}")]
    Auth(String),

    #[error("Unexpected mailbox response for {context}: {reason}")]
    InvalidResponse { context: String, reason: String },
}

/// AI analysis dispatch errors. The conversation stays pending and is
/// retried on a later tick; there is no in-call retry loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Analysis request failed: {0}")]
    Transport(String),

    #[error("Analysis endpoint returned {status}")]
    Rejected { status: u16 },

    #[error("Store error during dispatch: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
