use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    status::{StatusChannel, StatusEvent},
    storage::{db::SurrealDbClient, types::document::Document},
    utils::{embedding::EmbeddingProvider, identity::IdentityProvider},
};
use futures::Stream;
use ingestion_pipeline::IngestionPipeline;
use retrieval_pipeline::{
    answer::AnswerGenerator, answer_question, index::VectorIndex, RetrievalConfig,
};
use tracing::info;

/// Caller-facing facade over the ingestion and retrieval pipelines. Every
/// operation resolves the caller through the identity provider and enforces
/// ownership before touching a document.
pub struct DocumentService {
    db: Arc<SurrealDbClient>,
    index: Arc<VectorIndex>,
    status: StatusChannel,
    pipeline: Arc<IngestionPipeline>,
    embedding: Arc<EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    identity: Arc<dyn IdentityProvider>,
    retrieval: RetrievalConfig,
}

impl DocumentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<SurrealDbClient>,
        index: Arc<VectorIndex>,
        status: StatusChannel,
        pipeline: Arc<IngestionPipeline>,
        embedding: Arc<EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
        identity: Arc<dyn IdentityProvider>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            db,
            index,
            status,
            pipeline,
            embedding,
            generator,
            identity,
            retrieval,
        }
    }

    /// Accept an upload for the current caller. Returns the new document in
    /// `Processing`; ingestion continues in the background.
    pub async fn upload(&self, bytes: Bytes, file_name: &str) -> Result<Document, AppError> {
        let caller_id = self.identity.current_caller_id().await?;
        let document = self.pipeline.ingest(bytes, file_name, &caller_id).await?;
        info!(document_id = %document.id, file_name, "upload accepted");
        Ok(document)
    }

    /// All of the caller's documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>, AppError> {
        let caller_id = self.identity.current_caller_id().await?;
        Document::list_for_user(&self.db, &caller_id).await
    }

    /// Answer a question about one of the caller's documents.
    pub async fn query(&self, document_id: &str, question: &str) -> Result<String, AppError> {
        let caller_id = self.identity.current_caller_id().await?;
        answer_question(
            &self.db,
            &self.index,
            &self.embedding,
            self.generator.as_ref(),
            document_id,
            question,
            &caller_id,
            &self.retrieval,
        )
        .await
    }

    /// Open the live status stream for one of the caller's documents.
    /// Existence and ownership are checked before the subscription is
    /// created, so an unauthorized caller cannot displace the owner's
    /// subscriber.
    pub async fn subscribe_status(
        &self,
        document_id: &str,
    ) -> Result<impl Stream<Item = StatusEvent>, AppError> {
        let caller_id = self.identity.current_caller_id().await?;
        let document = Document::get(&self.db, document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))?;

        if document.user_id != caller_id {
            return Err(AppError::Auth(format!(
                "caller does not own document {document_id}"
            )));
        }

        Ok(self.status.subscribe(document_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{
        storage::{store::StorageManager, types::document::DocumentStatus},
        utils::{config::StorageKind, identity::FixedIdentity},
    };
    use futures::StreamExt;
    use ingestion_pipeline::{
        spawn_workers, DefaultPipelineServices, IngestionConfig, IngestionTuning, PipelineServices,
    };
    use object_store::memory::InMemory;
    use std::time::Duration;
    use uuid::Uuid;

    struct FixedGenerator(String);

    #[async_trait]
    impl AnswerGenerator for FixedGenerator {
        async fn generate(&self, _query: &str, _passages: &[String]) -> Result<String, AppError> {
            Ok(self.0.clone())
        }
    }

    struct TestApp {
        service: DocumentService,
        pipeline: Arc<IngestionPipeline>,
        receiver: flume::Receiver<String>,
    }

    async fn test_app(user_id: &str, services: Option<Arc<dyn PipelineServices>>) -> TestApp {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        db.ensure_initialized().await.expect("indexes");

        let index = Arc::new(VectorIndex::new());
        let status = StatusChannel::new();
        let embedding = Arc::new(EmbeddingProvider::new_hashed(32).expect("provider"));
        let services = services.unwrap_or_else(|| {
            Arc::new(DefaultPipelineServices::new(
                Arc::clone(&embedding),
                &IngestionTuning::default(),
            ))
        });
        let (jobs, receiver) = flume::bounded(16);

        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&db),
            StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory),
            Arc::clone(&index),
            status.clone(),
            jobs,
            services,
            IngestionConfig::default(),
        ));

        let service = DocumentService::new(
            db,
            index,
            status,
            Arc::clone(&pipeline),
            embedding,
            Arc::new(FixedGenerator("generated answer".into())),
            Arc::new(FixedIdentity::new(user_id)),
            RetrievalConfig::default(),
        );

        TestApp {
            service,
            pipeline,
            receiver,
        }
    }

    async fn next_event(
        stream: &mut (impl Stream<Item = StatusEvent> + Unpin),
    ) -> Option<StatusEvent> {
        tokio::time::timeout(Duration::from_secs(10), stream.next())
            .await
            .expect("status event within deadline")
    }

    #[tokio::test]
    async fn test_upload_process_and_query_end_to_end() {
        let app = test_app("owner", None).await;

        let document = app
            .service
            .upload(
                Bytes::from_static(b"rust is a systems programming language"),
                "rust.txt",
            )
            .await
            .expect("upload");
        assert_eq!(document.status, DocumentStatus::Processing);

        let mut stream = Box::pin(
            app.service
                .subscribe_status(&document.id)
                .await
                .expect("subscribe"),
        );

        // Workers start after the subscription so every event is observed.
        let handles = spawn_workers(Arc::clone(&app.pipeline), app.receiver.clone(), 1);

        assert_eq!(
            next_event(&mut stream).await,
            Some(StatusEvent::Connected {
                document_id: document.id.clone()
            })
        );

        let mut statuses = Vec::new();
        while let Some(event) = next_event(&mut stream).await {
            if let StatusEvent::Status { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![DocumentStatus::Processing, DocumentStatus::Processed]
        );

        let answer = app
            .service
            .query(&document.id, "what is rust?")
            .await
            .expect("answer");
        assert_eq!(answer, "generated answer");

        let listed = app.service.list_documents().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed.first().map(|d| d.status),
            Some(DocumentStatus::Processed)
        );

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_failed_extraction_ends_in_failed_stream_and_answer() {
        struct BrokenExtractor;

        #[async_trait]
        impl PipelineServices for BrokenExtractor {
            async fn extract_text(
                &self,
                _bytes: &Bytes,
                _file_name: &str,
            ) -> Result<String, AppError> {
                Err(AppError::Extraction("unreadable".into()))
            }

            async fn embed_chunks(&self, _chunks: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
                Ok(Vec::new())
            }
        }

        let app = test_app("owner", Some(Arc::new(BrokenExtractor))).await;

        let document = app
            .service
            .upload(Bytes::from_static(b"payload"), "broken.txt")
            .await
            .expect("upload");

        let mut stream = Box::pin(
            app.service
                .subscribe_status(&document.id)
                .await
                .expect("subscribe"),
        );
        let handles = spawn_workers(Arc::clone(&app.pipeline), app.receiver.clone(), 1);

        let mut last_status = None;
        while let Some(event) = next_event(&mut stream).await {
            if let StatusEvent::Status { status, .. } = event {
                last_status = Some(status);
            }
        }
        assert_eq!(last_status, Some(DocumentStatus::Failed));

        let answer = app
            .service
            .query(&document.id, "anything?")
            .await
            .expect("failure message");
        assert_eq!(answer, retrieval_pipeline::PROCESSING_FAILED_MESSAGE);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_concurrent_uploads_by_two_callers_stay_independent() {
        let alice_app = test_app("alice", None).await;

        // Same pipeline and database, a second caller.
        let bob_service = DocumentService::new(
            Arc::clone(&alice_app.service.db),
            Arc::clone(&alice_app.service.index),
            alice_app.service.status.clone(),
            Arc::clone(&alice_app.pipeline),
            Arc::clone(&alice_app.service.embedding),
            Arc::new(FixedGenerator("answer for bob".into())),
            Arc::new(FixedIdentity::new("bob")),
            RetrievalConfig::default(),
        );

        let (alice_doc, bob_doc) = tokio::join!(
            alice_app.service.upload(
                Bytes::from_static(b"alpha notes about rust ownership"),
                "alpha.txt",
            ),
            bob_service.upload(
                Bytes::from_static(b"beta notes about river fish"),
                "beta.txt",
            ),
        );
        let alice_doc = alice_doc.expect("alice upload");
        let bob_doc = bob_doc.expect("bob upload");
        assert_ne!(alice_doc.id, bob_doc.id);

        let mut alice_stream = Box::pin(
            alice_app
                .service
                .subscribe_status(&alice_doc.id)
                .await
                .expect("alice subscribe"),
        );
        let mut bob_stream = Box::pin(
            bob_service
                .subscribe_status(&bob_doc.id)
                .await
                .expect("bob subscribe"),
        );

        let handles = spawn_workers(Arc::clone(&alice_app.pipeline), alice_app.receiver.clone(), 2);

        // Each stream carries only its own document's events through to a
        // terminal Processed.
        for (stream, document) in [
            (&mut alice_stream, &alice_doc),
            (&mut bob_stream, &bob_doc),
        ] {
            let mut statuses = Vec::new();
            while let Some(event) = next_event(stream).await {
                match event {
                    StatusEvent::Connected { document_id } => {
                        assert_eq!(document_id, document.id);
                    }
                    StatusEvent::Status {
                        document_id,
                        status,
                        ..
                    } => {
                        assert_eq!(document_id, document.id);
                        statuses.push(status);
                    }
                }
            }
            assert_eq!(
                statuses,
                vec![DocumentStatus::Processing, DocumentStatus::Processed]
            );
        }

        assert!(alice_app.service.index.contains(&alice_doc.id));
        assert!(alice_app.service.index.contains(&bob_doc.id));

        let alice_answer = alice_app
            .service
            .query(&alice_doc.id, "what is ownership?")
            .await
            .expect("alice answer");
        assert_eq!(alice_answer, "generated answer");

        let bob_answer = bob_service
            .query(&bob_doc.id, "what fish?")
            .await
            .expect("bob answer");
        assert_eq!(bob_answer, "answer for bob");

        let alice_listed = alice_app.service.list_documents().await.expect("list");
        assert_eq!(
            alice_listed.iter().map(|d| d.id.clone()).collect::<Vec<_>>(),
            vec![alice_doc.id]
        );
        let bob_listed = bob_service.list_documents().await.expect("list");
        assert_eq!(
            bob_listed.iter().map(|d| d.id.clone()).collect::<Vec<_>>(),
            vec![bob_doc.id]
        );

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_subscribe_requires_ownership() {
        let owner_app = test_app("owner", None).await;
        let document = owner_app
            .service
            .upload(Bytes::from_static(b"text"), "note.txt")
            .await
            .expect("upload");

        // Same database, different caller.
        let intruder_service = DocumentService::new(
            Arc::clone(&owner_app.service.db),
            Arc::clone(&owner_app.service.index),
            owner_app.service.status.clone(),
            Arc::clone(&owner_app.pipeline),
            Arc::clone(&owner_app.service.embedding),
            Arc::new(FixedGenerator(String::new())),
            Arc::new(FixedIdentity::new("intruder")),
            RetrievalConfig::default(),
        );

        let subscribe = intruder_service.subscribe_status(&document.id).await;
        assert!(matches!(subscribe, Err(AppError::Auth(_))));

        let query = intruder_service.query(&document.id, "anything?").await;
        assert!(matches!(query, Err(AppError::Auth(_))));

        let missing = intruder_service.subscribe_status("no-such-doc").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_listing_is_scoped_to_caller() {
        let app = test_app("owner", None).await;
        app.service
            .upload(Bytes::from_static(b"mine"), "mine.txt")
            .await
            .expect("upload");

        let other_service = DocumentService::new(
            Arc::clone(&app.service.db),
            Arc::clone(&app.service.index),
            app.service.status.clone(),
            Arc::clone(&app.pipeline),
            Arc::clone(&app.service.embedding),
            Arc::new(FixedGenerator(String::new())),
            Arc::new(FixedIdentity::new("someone-else")),
            RetrievalConfig::default(),
        );

        assert_eq!(app.service.list_documents().await.expect("list").len(), 1);
        assert!(other_service
            .list_documents()
            .await
            .expect("list")
            .is_empty());
    }
}
