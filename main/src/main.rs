use arkiv::service::DocumentService;
use common::{
    status::StatusChannel,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
    utils::embedding::EmbeddingProvider,
    utils::identity::FixedIdentity,
};
use ingestion_pipeline::{
    spawn_workers, DefaultPipelineServices, IngestionConfig, IngestionPipeline, IngestionTuning,
};
use retrieval_pipeline::{answer::OpenAiAnswerGenerator, index::VectorIndex, RetrievalConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider =
        Arc::new(EmbeddingProvider::from_config(&config, Some(Arc::clone(&openai_client))).await?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let storage = StorageManager::new(&config).await?;
    let index = Arc::new(VectorIndex::new());
    let status = StatusChannel::new();

    let tuning = IngestionTuning::default();
    let (jobs, job_receiver) = flume::bounded(tuning.queue_capacity);
    let services = Arc::new(DefaultPipelineServices::new(
        Arc::clone(&embedding_provider),
        &tuning,
    ));

    let worker_count = tuning.worker_count;
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        storage,
        Arc::clone(&index),
        status.clone(),
        jobs,
        services,
        IngestionConfig { tuning },
    ));

    let generator = Arc::new(OpenAiAnswerGenerator::new(
        Arc::clone(&openai_client),
        &config.query_model,
    ));
    let service = DocumentService::new(
        db,
        index,
        status,
        Arc::clone(&pipeline),
        embedding_provider,
        generator,
        Arc::new(FixedIdentity::new(&config.local_user_id)),
        RetrievalConfig {
            top_k: config.retrieval_top_k,
            ..RetrievalConfig::default()
        },
    );
    info!(
        caller_id = %config.local_user_id,
        query_model = %config.query_model,
        "document service ready"
    );

    let worker_handles = spawn_workers(Arc::clone(&pipeline), job_receiver, worker_count);
    info!(worker_count, "ingestion workers running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping workers");
    for handle in worker_handles {
        handle.abort();
    }
    drop(service);

    Ok(())
}
