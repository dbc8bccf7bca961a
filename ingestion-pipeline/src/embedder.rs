use std::sync::Arc;
use std::time::Duration;

use common::{error::AppError, utils::embedding::EmbeddingProvider};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::warn;

/// Embeds chunk batches with per-call timeouts, retry with backoff, and a
/// dimension guard. The expected dimension is seeded from the provider when
/// the embedder is built; every vector produced afterwards must match it.
pub struct ChunkEmbedder {
    provider: Arc<EmbeddingProvider>,
    expected_dimension: usize,
    call_timeout: Duration,
    retry_base: Duration,
    retry_attempts: usize,
}

impl ChunkEmbedder {
    pub fn new(
        provider: Arc<EmbeddingProvider>,
        call_timeout: Duration,
        retry_base: Duration,
        retry_attempts: usize,
    ) -> Self {
        let expected_dimension = provider.dimension();
        Self {
            provider,
            expected_dimension,
            call_timeout,
            retry_base,
            retry_attempts,
        }
    }

    #[cfg(test)]
    fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = dimension;
        self
    }

    pub fn dimension(&self) -> usize {
        self.expected_dimension
    }

    /// Embed one text, retrying transient failures.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let strategy = ExponentialBackoff::from_millis(self.retry_base_millis())
            .map(jitter)
            .take(self.retry_attempts);

        let vector = Retry::spawn(strategy, || async {
            let attempt = tokio::time::timeout(self.call_timeout, self.provider.embed(text)).await;
            match attempt {
                Ok(Ok(vector)) => Ok(vector),
                Ok(Err(error)) => {
                    warn!(%error, "embedding call failed, may retry");
                    Err(AppError::Embedding(error.to_string()))
                }
                Err(_) => {
                    warn!("embedding call timed out, may retry");
                    Err(AppError::Embedding("embedding call timed out".into()))
                }
            }
        })
        .await?;

        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Embed a batch of chunks, preserving order.
    pub async fn embed_batch(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let strategy = ExponentialBackoff::from_millis(self.retry_base_millis())
            .map(jitter)
            .take(self.retry_attempts);

        let vectors = Retry::spawn(strategy, || async {
            let attempt = tokio::time::timeout(
                self.call_timeout,
                self.provider.embed_batch(chunks.to_vec()),
            )
            .await;
            match attempt {
                Ok(Ok(vectors)) => Ok(vectors),
                Ok(Err(error)) => {
                    warn!(%error, "batch embedding call failed, may retry");
                    Err(AppError::Embedding(error.to_string()))
                }
                Err(_) => {
                    warn!("batch embedding call timed out, may retry");
                    Err(AppError::Embedding("batch embedding call timed out".into()))
                }
            }
        })
        .await?;

        if vectors.len() != chunks.len() {
            return Err(AppError::Embedding(format!(
                "embedding backend returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        Ok(vectors)
    }

    fn retry_base_millis(&self) -> u64 {
        u64::try_from(self.retry_base.as_millis()).unwrap_or(u64::MAX)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), AppError> {
        if vector.len() != self.expected_dimension {
            return Err(AppError::Embedding(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.expected_dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}
