mod config;
mod services;

pub use config::{IngestionConfig, IngestionTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use common::{
    error::AppError,
    status::StatusChannel,
    storage::{
        db::SurrealDbClient,
        store::{blob_key, StorageManager},
        types::document::{Document, DocumentStatus},
    },
};
use retrieval_pipeline::index::{IndexedChunk, VectorIndex};
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::chunking::chunk_text;

/// Accepts uploads and drives queued documents through extraction, chunking,
/// embedding and indexing. Every document ends in a terminal state; stage
/// failures mark the document failed rather than propagating panics into the
/// worker.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    index: Arc<VectorIndex>,
    status: StatusChannel,
    jobs: flume::Sender<String>,
    services: Arc<dyn PipelineServices>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        index: Arc<VectorIndex>,
        status: StatusChannel,
        jobs: flume::Sender<String>,
        services: Arc<dyn PipelineServices>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            db,
            storage,
            index,
            status,
            jobs,
            services,
            config,
        }
    }

    pub fn status_channel(&self) -> &StatusChannel {
        &self.status
    }

    /// Accept an upload: persist the payload, create the document record in
    /// `Processing`, and enqueue it for the workers. Returns as soon as the
    /// job is queued; processing happens asynchronously.
    #[tracing::instrument(skip_all, fields(file_name, owner_id))]
    pub async fn ingest(
        &self,
        bytes: Bytes,
        file_name: &str,
        owner_id: &str,
    ) -> Result<Document, AppError> {
        let sha256 = sha256_hex(&bytes);
        let size_bytes = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        let key = blob_key(owner_id, file_name);

        // A failed blob write fails the upload synchronously; nothing has
        // been recorded yet.
        self.storage.put(&key, bytes).await?;

        let document =
            Document::create_and_store(&self.db, owner_id, file_name, &key, size_bytes, &sha256)
                .await?;

        if self.jobs.send_async(document.id.clone()).await.is_err() {
            error!(document_id = %document.id, "ingestion queue closed, failing upload");
            if let Err(mark_error) = document.mark_failed(&self.db).await {
                error!(document_id = %document.id, error = %mark_error, "failed to mark document failed");
            }
            self.status.publish(&document.id, DocumentStatus::Failed);
            return Err(AppError::InternalError(
                "ingestion workers are not running".into(),
            ));
        }

        info!(
            document_id = %document.id,
            size_bytes,
            "accepted document for ingestion"
        );
        Ok(document)
    }

    /// Run one queued document through the pipeline stages and record the
    /// terminal outcome. Never panics: every failure path marks the document
    /// failed and publishes the terminal status.
    #[tracing::instrument(skip_all, fields(document_id))]
    pub async fn process_document(&self, document_id: &str) -> Result<(), AppError> {
        let document = Document::get(&self.db, document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))?;

        if document.status.is_terminal() {
            info!(document_id, status = document.status.as_str(), "skipping already-terminal document");
            return Ok(());
        }

        self.status.publish(document_id, DocumentStatus::Processing);

        // Recording the terminal state is part of the fallible work: a
        // `mark_processed` that finds no record (or a conflicting write)
        // must still end in `Failed`, never in a stuck `Processing`.
        let outcome = match self.run_stages(&document).await {
            Ok(()) => document.mark_processed(&self.db).await.map(|_| ()),
            Err(stage_error) => Err(stage_error),
        };

        match outcome {
            Ok(()) => {
                self.status.publish(document_id, DocumentStatus::Processed);
                info!(document_id, "document processed");
                Ok(())
            }
            Err(error) => {
                let reason = error.to_string();
                error!(document_id, error = %reason, "document processing failed");

                if let Err(mark_error) = document.mark_failed(&self.db).await {
                    warn!(document_id, error = %mark_error, "failed to record failed status");
                }
                // A document that did not reach `Processed` must not answer
                // queries from a half-built index entry.
                self.index.remove(&document.id);
                self.status.publish(document_id, DocumentStatus::Failed);
                Err(AppError::Processing(reason))
            }
        }
    }

    async fn run_stages(&self, document: &Document) -> Result<(), AppError> {
        let tuning = &self.config.tuning;

        let blob = timeout(
            Duration::from_secs(tuning.blob_fetch_timeout_secs),
            self.storage.get(&document.blob_key),
        )
        .await
        .map_err(|_| AppError::Processing("blob fetch timed out".into()))??;

        let text = timeout(
            Duration::from_secs(tuning.extraction_timeout_secs),
            self.services.extract_text(&blob, &document.file_name),
        )
        .await
        .map_err(|_| AppError::Extraction("text extraction timed out".into()))??;

        let chunks = chunk_text(&text, tuning.chunk_range());
        if chunks.is_empty() {
            return Err(AppError::Extraction(format!(
                "no chunks produced for {}",
                document.file_name
            )));
        }

        let vectors = self.services.embed_chunks(&chunks).await?;

        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, embedding))| IndexedChunk {
                index,
                text,
                embedding,
            })
            .collect();

        info!(
            document_id = %document.id,
            chunks = indexed.len(),
            "indexed document chunks"
        );
        self.index.insert(&document.id, indexed);
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
