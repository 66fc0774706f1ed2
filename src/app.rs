//! Service container built once at startup and shared by the CLI and server.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::IndexManager;
use crate::query::QueryService;
use crate::remote::{create_source, RemoteSource};
use crate::snapshot::SnapshotStore;
use crate::status::StatusCell;
use crate::store::DocumentStore;
use crate::sync::SyncEngine;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: DocumentStore,
    pub index: Arc<IndexManager>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub sync: Arc<SyncEngine>,
    pub query: QueryService,
}

impl AppContext {
    /// Connect, migrate, and load (or rebuild) the vector index, using the
    /// provider and remote source named in `config`.
    pub async fn init(config: Config) -> Result<Self> {
        let pool = crate::db::connect(&config).await?;
        let provider = create_provider(&config.embedding)?;
        let source = create_source(&config.remote)?;
        Self::from_parts(config, pool, provider, source).await
    }

    /// Like [`init`](Self::init) with explicit collaborators.
    pub async fn from_parts(
        config: Config,
        pool: SqlitePool,
        provider: Arc<dyn EmbeddingProvider>,
        source: Option<Arc<dyn RemoteSource>>,
    ) -> Result<Self> {
        crate::migrate::run_migrations(&pool).await?;

        let store = DocumentStore::new(pool);
        let snapshots = SnapshotStore::new(config.index.dir.clone(), provider.model_name());
        let index = Arc::new(IndexManager::new(config.index_dims(), snapshots));

        let loaded = index.load_or_build(&store).await?;
        info!(source = ?loaded, vectors = index.len().await, "vector index ready");

        let status = Arc::new(StatusCell::new());
        let sync = Arc::new(SyncEngine::new(
            store.clone(),
            index.clone(),
            source,
            provider.clone(),
            status,
            &config.sync,
        ));
        let query = QueryService::new(store.clone(), index.clone(), provider.clone());

        Ok(Self {
            config: Arc::new(config),
            store,
            index,
            provider,
            sync,
            query,
        })
    }
}
