pub mod backfill;
pub mod backup;
pub mod maintenance;
pub mod retry;
pub mod save;
pub mod search;
pub mod status;

use anyhow::Context;
use engram_core::embedding::HttpEmbedder;
use engram_core::vector::qdrant::QdrantStore;
use engram_core::{get_config, Config, MemorySearch, VectorStore};
use std::sync::Arc;

/// Shared client bundle for commands that talk to the store.
pub struct Clients {
    pub config: Arc<Config>,
    pub store: Arc<QdrantStore>,
    pub embedder: Arc<HttpEmbedder>,
}

impl Clients {
    pub async fn connect() -> anyhow::Result<Self> {
        let config = get_config();
        let store =
            Arc::new(QdrantStore::connect(&config).context("vector store connection failed")?);
        if !store.healthy().await {
            anyhow::bail!("vector store is not reachable at {}", config.qdrant_url);
        }
        let embedder =
            Arc::new(HttpEmbedder::new(&config).context("embedding client construction failed")?);
        Ok(Self {
            config,
            store,
            embedder,
        })
    }

    pub fn search_client(&self) -> MemorySearch {
        MemorySearch::new(
            Arc::clone(&self.store) as Arc<dyn VectorStore>,
            Arc::clone(&self.embedder) as Arc<dyn engram_core::embedding::Embedder>,
        )
    }
}
