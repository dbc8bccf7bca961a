use async_openai::{
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use std::sync::Arc;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about a single uploaded document. \
Answer using only the provided context passages. If the context does not contain \
the answer, say so plainly instead of guessing.";

/// Format retrieved passages and the user's question into one prompt message.
pub fn create_user_message(passages: &[String], query: &str) -> String {
    let context = passages.join("\n---\n");
    format!(
        r"
        Context Information:
        ==================
        {context}

        User Question:
        ==================
        {query}
        "
    )
}

/// Turns a question plus retrieved passages into a natural-language answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, passages: &[String]) -> Result<String, AppError>;
}

/// Chat-completion backed generator.
pub struct OpenAiAnswerGenerator {
    client: Arc<Client<async_openai::config::OpenAIConfig>>,
    model: String,
}

impl OpenAiAnswerGenerator {
    pub fn new(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiAnswerGenerator {
    async fn generate(&self, query: &str, passages: &[String]) -> Result<String, AppError> {
        let user_message = create_user_message(passages, query);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(ANSWER_SYSTEM_PROMPT).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .build()
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::Generation("chat completion returned no content".into()))
    }
}
