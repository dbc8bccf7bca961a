use std::ops::Range;

/// Knobs for the ingestion worker pool and its per-stage limits.
#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub worker_count: usize,
    /// Bound on queued document ids awaiting processing.
    pub queue_capacity: usize,
    pub chunk_min_chars: usize,
    pub chunk_max_chars: usize,
    pub blob_fetch_timeout_secs: u64,
    pub extraction_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    pub embed_retry_base_ms: u64,
    pub embed_retry_attempts: usize,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 256,
            chunk_min_chars: 500,
            chunk_max_chars: 2000,
            blob_fetch_timeout_secs: 30,
            extraction_timeout_secs: 60,
            embedding_timeout_secs: 30,
            embed_retry_base_ms: 100,
            embed_retry_attempts: 3,
        }
    }
}

impl IngestionTuning {
    pub fn chunk_range(&self) -> Range<usize> {
        self.chunk_min_chars..self.chunk_max_chars
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let tuning = IngestionTuning::default();
        assert!(tuning.worker_count > 0);
        assert!(tuning.chunk_min_chars < tuning.chunk_max_chars);
        assert_eq!(tuning.chunk_range(), 500..2000);
    }
}
