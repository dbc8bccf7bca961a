#![allow(clippy::missing_docs_in_private_items)]

pub mod chunking;
pub mod embedder;
pub mod extraction;
pub mod pipeline;

pub use pipeline::{
    DefaultPipelineServices, IngestionConfig, IngestionPipeline, IngestionTuning, PipelineServices,
};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

/// Start `worker_count` workers draining the job queue. Each worker runs
/// until the queue's senders are all dropped.
pub fn spawn_workers(
    pipeline: Arc<IngestionPipeline>,
    jobs: flume::Receiver<String>,
    worker_count: usize,
) -> Vec<JoinHandle<()>> {
    (0..worker_count.max(1))
        .map(|worker_id| {
            let pipeline = Arc::clone(&pipeline);
            let jobs = jobs.clone();
            tokio::spawn(run_worker_loop(worker_id, pipeline, jobs))
        })
        .collect()
}

/// One worker: pull document ids off the queue and process them until the
/// queue closes. Processing errors are already recorded on the document, so
/// they are logged here and the loop moves on.
pub async fn run_worker_loop(
    worker_id: usize,
    pipeline: Arc<IngestionPipeline>,
    jobs: flume::Receiver<String>,
) {
    info!(worker_id, "ingestion worker started");

    while let Ok(document_id) = jobs.recv_async().await {
        info!(worker_id, %document_id, "claimed ingestion job");
        if let Err(error) = pipeline.process_document(&document_id).await {
            error!(worker_id, %document_id, %error, "ingestion job failed");
        }
    }

    info!(worker_id, "ingestion worker stopped");
}
