use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    OpenAI,
    #[default]
    FastEmbed,
    Hashed,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub surrealdb_address: String,
    #[serde(default)]
    pub surrealdb_username: String,
    #[serde(default)]
    pub surrealdb_password: String,
    #[serde(default = "default_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_database")]
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackendKind,
    /// Model override for the selected embedding backend. Each backend has a
    /// sensible default when unset.
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_query_model")]
    pub query_model: String,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    /// Caller id the daemon's fixed identity resolves to in single-user
    /// deployments.
    #[serde(default = "default_local_user_id")]
    pub local_user_id: String,
}

fn default_namespace() -> String {
    "arkiv".to_string()
}

fn default_database() -> String {
    "arkiv".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_dimensions() -> u32 {
    384
}

fn default_query_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_retrieval_top_k() -> usize {
    5
}

fn default_local_user_id() -> String {
    "local".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: default_namespace(),
            surrealdb_database: default_database(),
            data_dir: default_data_dir(),
            openai_base_url: default_base_url(),
            storage: default_storage_kind(),
            embedding_backend: EmbeddingBackendKind::default(),
            embedding_model: None,
            embedding_dimensions: default_embedding_dimensions(),
            query_model: default_query_model(),
            retrieval_top_k: default_retrieval_top_k(),
            local_user_id: default_local_user_id(),
        }
    }
}

/// Load configuration from an optional `config` file, then environment
/// variables on top.
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
