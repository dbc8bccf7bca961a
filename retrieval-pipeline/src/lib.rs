#![allow(clippy::missing_docs_in_private_items)]

pub mod answer;
pub mod index;
pub mod scoring;

use std::time::Duration;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::document::{Document, DocumentStatus},
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::{info, warn};

use crate::answer::AnswerGenerator;
use crate::index::VectorIndex;

/// Answer returned while a document has not finished processing.
pub const STILL_PROCESSING_MESSAGE: &str =
    "This document is still being processed. Please try again shortly.";

/// Answer returned for a document whose ingestion failed.
pub const PROCESSING_FAILED_MESSAGE: &str =
    "Processing failed for this document. Please upload it again.";

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Passages fed to the generator per question.
    pub top_k: usize,
    pub generation_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            generation_timeout_secs: 60,
        }
    }
}

/// Answer a natural-language question about one document.
///
/// Checks run in a fixed order: document existence, ownership, lifecycle
/// status. A non-terminal or failed document gets a fixed status message
/// instead of retrieval. For processed documents the query is embedded, the
/// top passages are pulled from the index and handed to the generator. A
/// generation failure degrades to a fallback answer built from the passages
/// rather than an error.
#[allow(clippy::too_many_arguments)]
pub async fn answer_question(
    db: &SurrealDbClient,
    index: &VectorIndex,
    embedding: &EmbeddingProvider,
    generator: &dyn AnswerGenerator,
    document_id: &str,
    query: &str,
    caller_id: &str,
    config: &RetrievalConfig,
) -> Result<String, AppError> {
    let document = Document::get(db, document_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))?;

    if document.user_id != caller_id {
        return Err(AppError::Auth(format!(
            "caller does not own document {document_id}"
        )));
    }

    match document.status {
        DocumentStatus::Processing => return Ok(STILL_PROCESSING_MESSAGE.to_string()),
        DocumentStatus::Failed => return Ok(PROCESSING_FAILED_MESSAGE.to_string()),
        DocumentStatus::Processed => {}
    }

    let query_vector = embedding
        .embed(query)
        .await
        .map_err(|e| AppError::Embedding(e.to_string()))?;

    let hits = index.query(document_id, &query_vector, config.top_k);
    if hits.is_empty() {
        return Err(AppError::NotFound(format!(
            "no indexed content for document {document_id}"
        )));
    }

    let passages: Vec<String> = hits.into_iter().map(|hit| hit.text).collect();
    info!(
        document_id,
        passages = passages.len(),
        "generating answer from retrieved passages"
    );

    let timeout = Duration::from_secs(config.generation_timeout_secs);
    match tokio::time::timeout(timeout, generator.generate(query, &passages)).await {
        Ok(Ok(answer)) => Ok(answer),
        Ok(Err(error)) => {
            warn!(document_id, %error, "answer generation failed, degrading to passages");
            Ok(degraded_answer(&passages))
        }
        Err(_) => {
            warn!(document_id, "answer generation timed out, degrading to passages");
            Ok(degraded_answer(&passages))
        }
    }
}

/// Fallback answer when the generator is unavailable: surface the retrieved
/// passages directly so the caller still gets something useful.
fn degraded_answer(passages: &[String]) -> String {
    let mut answer = String::from(
        "An answer could not be generated right now. \
         The most relevant passages from the document were:\n",
    );
    for passage in passages {
        answer.push_str("\n- ");
        answer.push_str(passage);
    }
    answer
}
