//! Wiring: one store, one embedding client and one chat provider shared by
//! the ingestion pipeline, retrieval and the assistant.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::assistant::Assistant;
use crate::completion::{create_chat_provider, ChatProvider};
use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingClient;
use crate::ingest::Ingestor;
use crate::migrate::run_migrations;
use crate::retrieval::Retriever;
use crate::store::sqlite::SqliteStore;
use crate::store::{ChunkStore, RecordStore};

#[derive(Clone)]
pub struct App {
    pub records: Arc<dyn RecordStore>,
    pub chunks: Arc<dyn ChunkStore>,
    pub ingestor: Ingestor,
    pub retriever: Retriever,
    pub assistant: Assistant,
}

impl App {
    /// Open the database, apply migrations and build the providers from
    /// `config`. Providers without an API key run in degraded mode.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config)
            .await
            .with_context(|| format!("opening database {}", config.db.path.display()))?;
        run_migrations(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool));
        store.ping().await.context("database ping failed")?;

        let embedder = EmbeddingClient::from_config(&config.embedding);
        let chat = create_chat_provider(&config.chat);
        info!(
            db = %config.db.path.display(),
            embeddings = embedder.is_available(),
            chat = chat.is_some(),
            "docdesk ready"
        );
        Ok(Self::from_store(store, config, embedder, chat))
    }

    /// Build the components over any store implementing both traits.
    pub fn from_store<S>(
        store: Arc<S>,
        config: &Config,
        embedder: EmbeddingClient,
        chat: Option<Arc<dyn ChatProvider>>,
    ) -> Self
    where
        S: RecordStore + ChunkStore + 'static,
    {
        let records: Arc<dyn RecordStore> = store.clone();
        let chunks: Arc<dyn ChunkStore> = store;

        let ingestor = Ingestor::new(
            records.clone(),
            chunks.clone(),
            embedder.clone(),
            config.chunking.clone(),
        );
        let retriever = Retriever::new(chunks.clone(), embedder, config.retrieval.clone());
        let assistant = Assistant::new(
            records.clone(),
            retriever.clone(),
            chat,
            config.chat.clone(),
        );

        Self {
            records,
            chunks,
            ingestor,
            retriever,
            assistant,
        }
    }
}
