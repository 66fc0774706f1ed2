//! SQLite-backed document store.
//!
//! Holds documents, their tags, and at most one embedding per document.
//! Reads go through [`DocumentStore`]; all writes for one document go through
//! a [`DocumentTx`] so content, tags, and embedding commit or roll back
//! together.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::embedding::vec_to_blob;
use crate::models::{Document, DocumentUpsert, StoreStats, StoredEmbedding, UpsertOutcome};

/// Separator used when aggregating tag names in SQL (ASCII unit separator).
const TAG_SEPARATOR: char = '\u{1f}';

const DOCUMENT_COLUMNS: &str = r#"
    d.id, d.title, d.content, d.created_at, d.modified_at, d.remote_modified_at, d.source_url,
    (SELECT GROUP_CONCAT(t.name, char(31))
       FROM document_tags dt JOIN tags t ON t.id = dt.tag_id
      WHERE dt.document_id = d.id) AS tag_names
"#;

const DOCUMENT_ORDER: &str =
    "ORDER BY d.remote_modified_at IS NULL, d.remote_modified_at DESC, d.title ASC";

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a write transaction scoped to one document's changes.
    pub async fn begin(&self) -> Result<DocumentTx> {
        Ok(DocumentTx {
            tx: self.pool.begin().await?,
        })
    }

    /// Whether upserting `doc` now would create or overwrite a row. Read
    /// outside any transaction; [`DocumentTx::upsert_document`] applies the
    /// same rule again when it writes.
    pub async fn would_replace(&self, doc: &DocumentUpsert) -> Result<bool> {
        let stored: Option<Option<i64>> =
            sqlx::query_scalar("SELECT remote_modified_at FROM documents WHERE id = ?")
                .bind(&doc.id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match stored {
            None => true,
            Some(stored) => {
                is_strictly_newer(doc.remote_modified_at.map(|t| t.timestamp_millis()), stored)
            }
        })
    }

    /// All stored embeddings in insertion order, still encoded.
    pub async fn list_embeddings(&self) -> Result<Vec<StoredEmbedding>> {
        let rows = sqlx::query("SELECT document_id, vector FROM embeddings ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| StoredEmbedding {
                document_id: row.get("document_id"),
                vector: row.get("vector"),
            })
            .collect())
    }

    /// Resolve documents by identifier. Order of the result is unspecified and
    /// unknown identifiers are silently absent.
    pub async fn find_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM documents d WHERE d.id IN ({})",
            DOCUMENT_COLUMNS, placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents d WHERE d.id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    /// Case-insensitive (ASCII) substring match on title or content, newest
    /// remote modification first, undated documents last, then by title.
    pub async fn search_by_text(&self, substring: &str, limit: i64) -> Result<Vec<Document>> {
        let pattern = like_pattern(substring);
        let sql = format!(
            r"SELECT {} FROM documents d
              WHERE d.title LIKE ? ESCAPE '\' OR d.content LIKE ? ESCAPE '\'
              {} LIMIT ?",
            DOCUMENT_COLUMNS, DOCUMENT_ORDER
        );

        let rows = sqlx::query(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    /// Page through documents in the same order as [`search_by_text`](Self::search_by_text).
    pub async fn list_documents(&self, skip: i64, limit: i64) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents d {} LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS, DOCUMENT_ORDER
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    /// Administrative delete. Tag links and the embedding go with it.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents) AS documents,
                (SELECT COUNT(*) FROM tags) AS tags,
                (SELECT COUNT(*) FROM embeddings) AS embeddings,
                (SELECT COALESCE(SUM(word_count), 0) FROM documents) AS words,
                (SELECT MAX(remote_modified_at) FROM documents) AS last_remote_modified
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let last: Option<i64> = row.get("last_remote_modified");

        Ok(StoreStats {
            documents: row.get("documents"),
            tags: row.get("tags"),
            embeddings: row.get("embeddings"),
            words: row.get("words"),
            last_remote_modified: last.and_then(DateTime::from_timestamp_millis),
        })
    }
}

/// Write transaction for a single document. Dropping it without
/// [`commit`](Self::commit) rolls everything back.
pub struct DocumentTx {
    tx: Transaction<'static, Sqlite>,
}

impl DocumentTx {
    /// Create the document if absent; otherwise overwrite it only when the
    /// incoming remote time is strictly newer than the stored one.
    pub async fn upsert_document(&mut self, doc: &DocumentUpsert) -> Result<UpsertOutcome> {
        let now = Utc::now().timestamp_millis();
        let incoming = doc.remote_modified_at.map(|t| t.timestamp_millis());
        let word_count = count_words(&doc.content);

        let existing = sqlx::query("SELECT remote_modified_at FROM documents WHERE id = ?")
            .bind(&doc.id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (id, title, content, word_count, created_at, modified_at,
                                           remote_modified_at, source_url)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&doc.id)
                .bind(&doc.title)
                .bind(&doc.content)
                .bind(word_count)
                .bind(now)
                .bind(now)
                .bind(incoming)
                .bind(&doc.source_url)
                .execute(&mut *self.tx)
                .await?;

                Ok(UpsertOutcome::Created)
            }
            Some(row) => {
                let stored: Option<i64> = row.get("remote_modified_at");
                if !is_strictly_newer(incoming, stored) {
                    return Ok(UpsertOutcome::Unchanged);
                }

                sqlx::query(
                    r#"
                    UPDATE documents
                       SET title = ?, content = ?, word_count = ?, modified_at = ?,
                           remote_modified_at = ?, source_url = ?
                     WHERE id = ?
                    "#,
                )
                .bind(&doc.title)
                .bind(&doc.content)
                .bind(word_count)
                .bind(now)
                .bind(incoming)
                .bind(&doc.source_url)
                .bind(&doc.id)
                .execute(&mut *self.tx)
                .await?;

                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Replace the document's tag links with exactly `names`, creating tag
    /// rows as needed and reusing existing ones by name.
    pub async fn replace_tags<I, S>(&mut self, document_id: &str, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *self.tx)
            .await?;

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }

            sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .execute(&mut *self.tx)
                .await?;

            let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *self.tx)
                .await?;

            sqlx::query("INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?, ?)")
                .bind(document_id)
                .bind(tag_id)
                .execute(&mut *self.tx)
                .await?;
        }

        Ok(())
    }

    /// Insert or overwrite the single embedding row of a document.
    pub async fn upsert_embedding(
        &mut self,
        document_id: &str,
        vector: &[f32],
        model_name: &str,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO embeddings (document_id, vector, model_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                vector = excluded.vector,
                model_name = excluded.model_name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(vec_to_blob(vector))
        .bind(model_name)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn is_strictly_newer(incoming: Option<i64>, stored: Option<i64>) -> bool {
    match (incoming, stored) {
        (Some(incoming), Some(stored)) => incoming > stored,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn count_words(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

/// Build a `LIKE` pattern matching `s` anywhere, with `\` as escape character.
fn like_pattern(s: &str) -> String {
    let mut pattern = String::with_capacity(s.len() + 2);
    pattern.push('%');
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Document {
    let remote: Option<i64> = row.get("remote_modified_at");
    let tag_names: Option<String> = row.get("tag_names");

    let mut tags: Vec<String> = tag_names
        .map(|names| {
            names
                .split(TAG_SEPARATOR)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    tags.sort();

    Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        created_at: millis_to_datetime(row.get("created_at")),
        modified_at: millis_to_datetime(row.get("modified_at")),
        remote_modified_at: remote.map(millis_to_datetime),
        source_url: row.get("source_url"),
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_check_is_strict() {
        assert!(is_strictly_newer(Some(2), Some(1)));
        assert!(!is_strictly_newer(Some(1), Some(1)));
        assert!(!is_strictly_newer(Some(0), Some(1)));
        assert!(is_strictly_newer(Some(1), None));
        assert!(!is_strictly_newer(None, Some(1)));
        assert!(!is_strictly_newer(None, None));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\x"), "%c:\\\\x%");
    }

    #[test]
    fn words_are_counted_on_whitespace() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("one  two\nthree\t"), 3);
    }
}
