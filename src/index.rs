//! In-memory nearest-neighbor index over document embeddings.
//!
//! [`VectorIndex`] is an immutable flat index: unit-normalized vectors stored
//! back to back plus a parallel list of document identifiers, position `i` in
//! one naming row `i` of the other. Ranking is by L2 distance between
//! normalized vectors, which orders results the same way as cosine similarity.
//!
//! [`IndexManager`] owns the live index behind a lock and swaps in a fully
//! built replacement, so concurrent searches observe either the old index or
//! the new one. It also drives snapshot persistence through [`SnapshotStore`].
//! Builds, swaps and snapshot writes are serialized by a separate build lock,
//! held from reading the store's embeddings until the snapshot is on disk.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::embedding::blob_to_vec;
use crate::models::StoredEmbedding;
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    data: Vec<f32>,
    ids: Vec<String>,
}

/// Result of [`VectorIndex::build`].
#[derive(Debug)]
pub struct BuildOutcome {
    /// `None` when no entry was admitted.
    pub index: Option<VectorIndex>,
    pub dropped: usize,
}

impl VectorIndex {
    /// Build from stored embeddings, in the given order.
    ///
    /// Entries that do not decode, do not have `dims` components, or cannot
    /// be normalized are dropped with a warning. When `dims` is `None` the
    /// dimension of the first decodable entry is used.
    pub fn build(dims: Option<usize>, entries: &[StoredEmbedding]) -> BuildOutcome {
        let mut expected = dims;
        let mut data = Vec::new();
        let mut ids = Vec::new();
        let mut dropped = 0usize;

        for entry in entries {
            let Some(vector) = blob_to_vec(&entry.vector).filter(|v| !v.is_empty()) else {
                warn!(document_id = %entry.document_id, bytes = entry.vector.len(), "dropping malformed embedding");
                dropped += 1;
                continue;
            };

            let dims = *expected.get_or_insert(vector.len());
            if vector.len() != dims {
                warn!(
                    document_id = %entry.document_id,
                    expected = dims,
                    got = vector.len(),
                    "dropping embedding with wrong dimension"
                );
                dropped += 1;
                continue;
            }

            let Some(normalized) = normalize(&vector) else {
                warn!(document_id = %entry.document_id, "dropping embedding that cannot be normalized");
                dropped += 1;
                continue;
            };

            data.extend_from_slice(&normalized);
            ids.push(entry.document_id.clone());
        }

        let index = match expected {
            Some(dims) if !ids.is_empty() => Some(VectorIndex { dims, data, ids }),
            _ => None,
        };

        BuildOutcome { index, dropped }
    }

    /// Reassemble an index from already-normalized parts (snapshot load).
    pub(crate) fn from_parts(dims: usize, data: Vec<f32>, ids: Vec<String>) -> Self {
        debug_assert_eq!(data.len(), dims * ids.len());
        Self { dims, data, ids }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of stored vectors; always equal to the identifier count.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    /// Identifiers of the `k` nearest vectors, nearest first, ties broken by
    /// insertion order. `k` is clamped to the index size. A query with the
    /// wrong dimension or zero norm matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<String> {
        let k = k.min(self.len());
        if k == 0 {
            return Vec::new();
        }
        if query.len() != self.dims {
            warn!(expected = self.dims, got = query.len(), "query dimension mismatch");
            return Vec::new();
        }
        let Some(query) = normalize(query) else {
            return Vec::new();
        };

        let mut scored: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(pos, row)| (squared_l2(&query, row), pos))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        scored
            .into_iter()
            .take(k)
            .map(|(_, pos)| self.ids[pos].clone())
            .collect()
    }
}

/// Scale to unit L2 norm. `None` for zero-norm or non-finite input.
fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm < f32::EPSILON {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// What happened when the snapshot was written.
///
/// The in-memory index is valid regardless; only `Persisted` means a reload
/// would reproduce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    /// Index is absent; any stale snapshot files were deleted.
    Cleared,
    Failed(String),
}

/// Summary of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub admitted: usize,
    pub dropped: usize,
}

/// Where the live index came from during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Snapshot,
    Rebuilt,
    Absent,
}

/// Shared owner of the live index.
pub struct IndexManager {
    dims: Option<usize>,
    snapshots: SnapshotStore,
    current: RwLock<Option<Arc<VectorIndex>>>,
    build: Mutex<()>,
}

impl IndexManager {
    pub fn new(dims: Option<usize>, snapshots: SnapshotStore) -> Self {
        Self {
            dims,
            snapshots,
            current: RwLock::new(None),
            build: Mutex::new(()),
        }
    }

    /// The live index, if any.
    pub async fn current(&self) -> Option<Arc<VectorIndex>> {
        self.current.read().await.clone()
    }

    pub async fn is_available(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Vector count of the live index, zero when absent.
    pub async fn len(&self) -> usize {
        self.current().await.map(|i| i.len()).unwrap_or(0)
    }

    /// Replace the live index with one built from `entries`. With nothing
    /// admitted the index becomes absent and the snapshot files are removed.
    pub async fn rebuild(&self, entries: &[StoredEmbedding]) -> RebuildReport {
        let _build = self.build.lock().await;
        self.install(entries).await
    }

    /// Write the live index to disk. Failures are logged and reported, never
    /// raised.
    pub async fn persist(&self) -> PersistOutcome {
        let _build = self.build.lock().await;
        self.write_snapshot().await
    }

    /// Rebuild from the store's current embeddings and persist the result as
    /// one step. A concurrent build waits for this one to finish.
    pub async fn rebuild_from_store(
        &self,
        store: &DocumentStore,
    ) -> Result<(RebuildReport, PersistOutcome)> {
        let _build = self.build.lock().await;
        let entries = store.list_embeddings().await?;
        let report = self.install(&entries).await;
        let persisted = self.write_snapshot().await;
        Ok((report, persisted))
    }

    /// Install the persisted snapshot if it is valid, otherwise rebuild from
    /// the store's current embeddings (and persist the result).
    pub async fn load_or_build(&self, store: &DocumentStore) -> Result<LoadSource> {
        let _build = self.build.lock().await;
        self.load_or_build_locked(store).await
    }

    /// The live index, loading or building one first when none is installed.
    /// An index installed by a build that finished while this call waited is
    /// returned as is.
    pub async fn ensure_loaded(&self, store: &DocumentStore) -> Result<Option<Arc<VectorIndex>>> {
        if let Some(index) = self.current().await {
            return Ok(Some(index));
        }

        let _build = self.build.lock().await;
        if let Some(index) = self.current().await {
            return Ok(Some(index));
        }
        self.load_or_build_locked(store).await?;
        Ok(self.current().await)
    }

    async fn load_or_build_locked(&self, store: &DocumentStore) -> Result<LoadSource> {
        let snapshots = self.snapshots.clone();
        let dims = self.dims;
        let loaded = tokio::task::spawn_blocking(move || snapshots.load(dims)).await?;

        match loaded {
            Ok(index) => {
                info!(vectors = index.len(), "loaded index snapshot");
                *self.current.write().await = Some(Arc::new(index));
                return Ok(LoadSource::Snapshot);
            }
            Err(SnapshotError::Missing) => debug!("no index snapshot, building from store"),
            Err(e) => warn!(error = %e, "rejecting index snapshot, rebuilding from store"),
        }

        let entries = store.list_embeddings().await?;
        let report = self.install(&entries).await;
        if report.admitted == 0 {
            return Ok(LoadSource::Absent);
        }

        self.write_snapshot().await;
        Ok(LoadSource::Rebuilt)
    }

    async fn install(&self, entries: &[StoredEmbedding]) -> RebuildReport {
        let BuildOutcome { index, dropped } = VectorIndex::build(self.dims, entries);
        let admitted = index.as_ref().map(|i| i.len()).unwrap_or(0);

        if index.is_none() {
            if let Err(e) = self.remove_snapshot().await {
                warn!(error = %e, "failed to remove stale index snapshot");
            }
        }

        *self.current.write().await = index.map(Arc::new);
        info!(admitted, dropped, "vector index rebuilt");

        RebuildReport { admitted, dropped }
    }

    async fn write_snapshot(&self) -> PersistOutcome {
        let Some(index) = self.current().await else {
            return match self.remove_snapshot().await {
                Ok(()) => PersistOutcome::Cleared,
                Err(e) => {
                    warn!(error = %e, "failed to remove stale index snapshot");
                    PersistOutcome::Failed(e.to_string())
                }
            };
        };

        let snapshots = self.snapshots.clone();
        let result = tokio::task::spawn_blocking(move || snapshots.save(&index)).await;

        match result {
            Ok(Ok(())) => {
                debug!(dir = %self.snapshots.dir().display(), "index snapshot written");
                PersistOutcome::Persisted
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to persist index snapshot");
                PersistOutcome::Failed(e.to_string())
            }
            Err(e) => {
                warn!(error = %e, "index snapshot task failed");
                PersistOutcome::Failed(e.to_string())
            }
        }
    }

    /// Search the live index; empty when the index is absent.
    pub async fn search(&self, query: &[f32], k: usize) -> Vec<String> {
        match self.current().await {
            Some(index) => index.search(query, k),
            None => Vec::new(),
        }
    }

    async fn remove_snapshot(&self) -> Result<(), SnapshotError> {
        let snapshots = self.snapshots.clone();
        tokio::task::spawn_blocking(move || snapshots.remove())
            .await
            .map_err(|e| SnapshotError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}
