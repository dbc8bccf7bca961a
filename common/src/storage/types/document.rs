use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient};

use super::{surreal_serde, StoredObject};

/// Lifecycle of an uploaded document. `Processing` is the only non-terminal
/// state; transitions are one-way.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentStatus {
    #[serde(rename = "Processing")]
    #[default]
    Processing,
    #[serde(rename = "Processed")]
    Processed,
    #[serde(rename = "Failed")]
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "Processing",
            DocumentStatus::Processed => "Processed",
            DocumentStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum DocumentTransition {
    Complete,
    Fail,
}

impl DocumentTransition {
    fn as_str(&self) -> &'static str {
        match self {
            DocumentTransition::Complete => "complete",
            DocumentTransition::Fail => "fail",
        }
    }

    fn target(&self) -> DocumentStatus {
        match self {
            DocumentTransition::Complete => DocumentStatus::Processed,
            DocumentTransition::Fail => DocumentStatus::Failed,
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: DocumentLifecycleMachine,
        initial: Processing,
        states: [Processing, Processed, Failed],
        events {
            complete {
                transition: { from: Processing, to: Processed }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
        }
    }

    pub(super) fn processing() -> DocumentLifecycleMachine<(), Processing> {
        DocumentLifecycleMachine::new(())
    }
}

fn invalid_transition(state: &DocumentStatus, event: DocumentTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid document transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(
    state: &DocumentStatus,
    event: DocumentTransition,
) -> Result<DocumentStatus, AppError> {
    use lifecycle::processing;
    match (state, event) {
        (DocumentStatus::Processing, DocumentTransition::Complete) => processing()
            .complete()
            .map(|_| DocumentStatus::Processed)
            .map_err(|_| invalid_transition(state, event)),
        (DocumentStatus::Processing, DocumentTransition::Fail) => processing()
            .fail()
            .map(|_| DocumentStatus::Failed)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// An uploaded document and its canonical lifecycle state. The record in
/// SurrealDB is the single source of truth for `status`; the status channel
/// is only a notification overlay on top of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(deserialize_with = "surreal_serde::deserialize_flexible_id")]
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub blob_key: String,
    pub status: DocumentStatus,
    pub size_bytes: u64,
    pub sha256: String,
    #[serde(
        serialize_with = "surreal_serde::serialize_datetime",
        deserialize_with = "surreal_serde::deserialize_datetime",
        default
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        serialize_with = "surreal_serde::serialize_datetime",
        deserialize_with = "surreal_serde::deserialize_datetime",
        default
    )]
    pub updated_at: DateTime<Utc>,
}

impl StoredObject for Document {
    fn table_name() -> &'static str {
        "document"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl Document {
    pub fn new(
        user_id: &str,
        file_name: &str,
        blob_key: &str,
        size_bytes: u64,
        sha256: &str,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            file_name: file_name.to_owned(),
            blob_key: blob_key.to_owned(),
            status: DocumentStatus::Processing,
            size_bytes,
            sha256: sha256.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create_and_store(
        db: &SurrealDbClient,
        user_id: &str,
        file_name: &str,
        blob_key: &str,
        size_bytes: u64,
        sha256: &str,
    ) -> Result<Document, AppError> {
        let document = Self::new(user_id, file_name, blob_key, size_bytes, sha256);
        db.store_item(document.clone()).await?;
        Ok(document)
    }

    pub async fn get(db: &SurrealDbClient, id: &str) -> Result<Option<Document>, AppError> {
        Ok(db.get_item::<Document>(id).await?)
    }

    /// All documents owned by `user_id`, newest first.
    pub async fn list_for_user(
        db: &SurrealDbClient,
        user_id: &str,
    ) -> Result<Vec<Document>, AppError> {
        let documents: Vec<Document> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE user_id = $user_id
                 ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_owned()))
            .await?
            .take(0)?;

        Ok(documents)
    }

    pub async fn mark_processed(&self, db: &SurrealDbClient) -> Result<Document, AppError> {
        self.mark_terminal(DocumentTransition::Complete, db).await
    }

    pub async fn mark_failed(&self, db: &SurrealDbClient) -> Result<Document, AppError> {
        self.mark_terminal(DocumentTransition::Fail, db).await
    }

    /// Read-modify-write with a status guard so terminal states are
    /// monotone: only a `Processing` record is updated. Re-applying the
    /// same terminal state is a no-op; a conflicting terminal write is
    /// rejected as a validation error.
    async fn mark_terminal(
        &self,
        event: DocumentTransition,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        let target = event.target();
        if self.status == target {
            return Ok(self.clone());
        }

        compute_next_state(&self.status, event)?;

        const TERMINAL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $target, updated_at = $now
            WHERE status = $processing
            RETURN *;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(TERMINAL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("target", target.as_str()))
            .bind(("processing", DocumentStatus::Processing.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<Document> = result.take(0)?;
        match updated {
            Some(document) => Ok(document),
            None => {
                let current = db
                    .get_item::<Document>(&self.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("document {}", self.id)))?;
                if current.status == target {
                    Ok(current)
                } else {
                    Err(invalid_transition(&current.status, event))
                }
            }
        }
    }
}
