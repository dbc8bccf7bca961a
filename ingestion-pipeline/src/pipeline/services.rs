use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::{error::AppError, utils::embedding::EmbeddingProvider};

use crate::embedder::ChunkEmbedder;
use crate::extraction;

use super::config::IngestionTuning;

/// The pipeline's external collaborators. Production uses the real extractor
/// and embedding backend; tests swap in stubs.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn extract_text(&self, bytes: &Bytes, file_name: &str) -> Result<String, AppError>;
    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

pub struct DefaultPipelineServices {
    embedder: ChunkEmbedder,
}

impl DefaultPipelineServices {
    pub fn new(provider: Arc<EmbeddingProvider>, tuning: &IngestionTuning) -> Self {
        let embedder = ChunkEmbedder::new(
            provider,
            Duration::from_secs(tuning.embedding_timeout_secs),
            Duration::from_millis(tuning.embed_retry_base_ms),
            tuning.embed_retry_attempts,
        );
        Self { embedder }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn extract_text(&self, bytes: &Bytes, file_name: &str) -> Result<String, AppError> {
        extraction::extract_text(bytes, file_name).await
    }

    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.embedder.embed_batch(chunks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_services_extract_and_embed() {
        let provider = Arc::new(EmbeddingProvider::new_hashed(32).expect("provider"));
        let services = DefaultPipelineServices::new(provider, &IngestionTuning::default());
        assert_eq!(services.embedding_dimension(), 32);

        let text = services
            .extract_text(&Bytes::from_static(b"some plain text"), "note.txt")
            .await
            .expect("extract");
        assert_eq!(text, "some plain text");

        let vectors = services
            .embed_chunks(&[text])
            .await
            .expect("embed");
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors.first().map(Vec::len), Some(32));
    }
}
