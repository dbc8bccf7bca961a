use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Blob storage error: {0}")]
    Storage(#[from] object_store::Error),
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Answer generation failed: {0}")]
    Generation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Authentication required: {0}")]
    Unauthenticated(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
