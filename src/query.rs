//! Semantic and lexical retrieval over synchronized documents.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::index::IndexManager;
use crate::models::Document;
use crate::store::DocumentStore;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyQuery,

    /// No index could be loaded or built.
    #[error("semantic search is unavailable: no embeddings indexed")]
    SearchUnavailable,

    #[error("cannot embed query: {0}")]
    CannotEmbedQuery(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct QueryService {
    store: DocumentStore,
    index: Arc<IndexManager>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl QueryService {
    pub fn new(
        store: DocumentStore,
        index: Arc<IndexManager>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            index,
            provider,
        }
    }

    /// The `k` documents nearest to `query`, nearest first.
    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<Document>, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        if !self.index.is_available().await {
            debug!("no live index, attempting load");
        }
        let index = self
            .index
            .ensure_loaded(&self.store)
            .await?
            .ok_or(QueryError::SearchUnavailable)?;

        let vector = match self.provider.embed(query).await {
            Ok(Some(v)) => v,
            Ok(None) => return Err(QueryError::CannotEmbedQuery("no embedding returned".to_string())),
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return Err(QueryError::CannotEmbedQuery(e.to_string()));
            }
        };
        if vector.len() != index.dims() {
            return Err(QueryError::CannotEmbedQuery(format!(
                "query embedding has {} dimensions, index has {}",
                vector.len(),
                index.dims()
            )));
        }

        let ranked = index.search(&vector, k);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.store.find_documents(&ranked).await?;
        Ok(order_by_rank(&ranked, found))
    }

    /// Substring match on title or content, in store order.
    pub async fn lexical_search(&self, substring: &str, limit: i64) -> Result<Vec<Document>, QueryError> {
        Ok(self.store.search_by_text(substring, limit).await?)
    }
}

/// Arrange `docs` in the order of `ranked`. Identifiers without a document
/// (deleted since the last rebuild) are dropped.
fn order_by_rank(ranked: &[String], docs: Vec<Document>) -> Vec<Document> {
    let mut by_id: HashMap<String, Document> =
        docs.into_iter().map(|d| (d.id.clone(), d)).collect();
    ranked.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_string(),
            content: String::new(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            remote_modified_at: None,
            source_url: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn restores_rank_and_drops_unresolved() {
        let ranked = vec!["c".to_string(), "gone".to_string(), "a".to_string(), "b".to_string()];
        let docs = vec![doc("a"), doc("b"), doc("c")];
        let ids: Vec<String> = order_by_rank(&ranked, docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
