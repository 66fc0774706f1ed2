//! Core data types shared by the store, the sync engine, and the query side.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A synchronized note as stored locally.
///
/// `id` is the remote file identifier and doubles as the join key into the
/// vector index.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Authoritative for change detection. Absent when the remote time could
    /// not be parsed.
    pub remote_modified_at: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
    /// Tag names, sorted.
    pub tags: Vec<String>,
}

/// Fields written by [`DocumentTx::upsert_document`](crate::store::DocumentTx::upsert_document).
#[derive(Debug, Clone)]
pub struct DocumentUpsert {
    pub id: String,
    pub title: String,
    pub content: String,
    pub remote_modified_at: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Stored remote time is not older than the incoming one; nothing written.
    Unchanged,
}

impl UpsertOutcome {
    /// True when content changed and tags/embedding must be regenerated.
    pub fn is_changed(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// An embedding row as read back for index construction. The vector is still
/// in its stored (encoded) form.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub document_id: String,
    pub vector: Vec<u8>,
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub tags: i64,
    pub embeddings: i64,
    pub words: i64,
    pub last_remote_modified: Option<DateTime<Utc>>,
}
