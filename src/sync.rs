//! Sync orchestration.
//!
//! A sync run lists the remote, then processes each listed file in order:
//!
//! ```text
//! list ─► for each file:
//!           markdown? ─► download ─► parse time ─► newer than stored?
//!             embed ─► BEGIN ─► upsert ─► tags + embedding ─► COMMIT
//!         ─► any created/updated? ─► rebuild index ─► persist snapshot
//! ```
//!
//! Each file commits in its own transaction. A failure on one file rolls back
//! that file only; the run continues. Failures before the loop (no source,
//! listing error) or during the index rebuild end the run in the `error`
//! phase.
//!
//! Only one run is active at a time. [`SyncEngine::trigger`] spawns the run on
//! the runtime and returns at once; [`SyncEngine::run_inline`] runs it in the
//! caller's task.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::embedding::EmbeddingProvider;
use crate::index::IndexManager;
use crate::models::{DocumentUpsert, UpsertOutcome};
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::remote::{is_markdown, title_for, RemoteFile, RemoteSource};
use crate::status::{StatusCell, SyncPhase, SyncStatus, SyncTriggerError};
use crate::store::DocumentStore;
use crate::tags::extract_tags;

/// Counts for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    pub listed: u64,
    /// Not markdown/text; never downloaded.
    pub skipped: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
    /// Embeddings written this run.
    pub embedded: u64,
    pub index_rebuilt: bool,
}

impl SyncReport {
    fn summary(&self) -> String {
        format!(
            "Synced {} files: {} created, {} updated, {} unchanged, {} skipped, {} failed",
            self.listed, self.created, self.updated, self.unchanged, self.skipped, self.failed
        )
    }
}

pub struct SyncEngine {
    store: DocumentStore,
    index: Arc<IndexManager>,
    source: Option<Arc<dyn RemoteSource>>,
    provider: Arc<dyn EmbeddingProvider>,
    status: Arc<StatusCell>,
    download_timeout: Duration,
    embed_timeout: Duration,
}

impl SyncEngine {
    pub fn new(
        store: DocumentStore,
        index: Arc<IndexManager>,
        source: Option<Arc<dyn RemoteSource>>,
        provider: Arc<dyn EmbeddingProvider>,
        status: Arc<StatusCell>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            index,
            source,
            provider,
            status,
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    /// Start a run in the background. Rejected, not queued, when a run is
    /// already active.
    pub fn trigger(self: &Arc<Self>) -> Result<(), SyncTriggerError> {
        self.status.try_begin()?;
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // Outcome is recorded in the status cell.
            let _ = engine.execute(&NoProgress).await;
        });
        Ok(())
    }

    /// Run to completion in the current task.
    pub async fn run_inline(&self, reporter: &dyn SyncProgressReporter) -> Result<SyncReport> {
        self.status.try_begin()?;
        self.execute(reporter).await
    }

    /// Body of a run whose `Syncing` phase has already been claimed.
    async fn execute(&self, reporter: &dyn SyncProgressReporter) -> Result<SyncReport> {
        let started = std::time::Instant::now();
        match self.run(reporter).await {
            Ok(report) => {
                let message = report.summary();
                info!(
                    created = report.created,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync finished"
                );
                self.status.update(|s| SyncStatus {
                    phase: SyncPhase::Success,
                    message,
                    last_error: None,
                    last_success_at: Some(Utc::now()),
                    processed: s.processed,
                    total: s.total,
                });
                Ok(report)
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                error!(error = %detail, "sync failed");
                self.status.update(|s| SyncStatus {
                    phase: SyncPhase::Error,
                    message: "Sync failed".to_string(),
                    last_error: Some(detail.clone()),
                    last_success_at: s.last_success_at,
                    processed: s.processed,
                    total: s.total,
                });
                Err(e)
            }
        }
    }

    async fn run(&self, reporter: &dyn SyncProgressReporter) -> Result<SyncReport> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("no remote source configured"))?;

        reporter.report(SyncProgressEvent::Listing);
        let files = source
            .list()
            .await
            .with_context(|| format!("listing {} source failed", source.name()))?;

        let total = files.len() as u64;
        let mut report = SyncReport {
            listed: total,
            ..SyncReport::default()
        };
        self.status.update(|s| SyncStatus {
            message: format!("Found {} files", total),
            total,
            ..s.clone()
        });
        info!(source = source.name(), files = total, "remote listing received");

        for (i, file) in files.iter().enumerate() {
            let n = i as u64 + 1;
            reporter.report(SyncProgressEvent::Processing {
                n,
                total,
                name: file.name.clone(),
            });

            if !is_markdown(file) {
                debug!(remote_id = %file.remote_id, mime = %file.mime_type, "skipping non-markdown file");
                report.skipped += 1;
            } else {
                match self.process_file(source.as_ref(), file).await {
                    Ok(FileOutcome { upsert, embedded }) => {
                        match upsert {
                            UpsertOutcome::Created => report.created += 1,
                            UpsertOutcome::Updated => report.updated += 1,
                            UpsertOutcome::Unchanged => report.unchanged += 1,
                        }
                        if embedded {
                            report.embedded += 1;
                        }
                    }
                    Err(e) => {
                        warn!(remote_id = %file.remote_id, name = %file.name, error = %format!("{:#}", e), "file sync failed");
                        report.failed += 1;
                    }
                }
            }

            self.status.update(|s| SyncStatus {
                message: format!("Processed {}/{}: {}", n, total, file.name),
                processed: n,
                ..s.clone()
            });
        }

        if report.created + report.updated > 0 {
            reporter.report(SyncProgressEvent::Rebuilding);
            self.index.rebuild_from_store(&self.store).await?;
            report.index_rebuilt = true;
        }

        Ok(report)
    }

    /// Download and store one file. Any error leaves the store as it was
    /// before this file.
    async fn process_file(&self, source: &dyn RemoteSource, file: &RemoteFile) -> Result<FileOutcome> {
        let bytes = tokio::time::timeout(self.download_timeout, source.download(file))
            .await
            .map_err(|_| anyhow!("download timed out after {:?}", self.download_timeout))??;
        let content = String::from_utf8(bytes).context("content is not valid UTF-8")?;

        let doc = DocumentUpsert {
            id: file.remote_id.clone(),
            title: title_for(file),
            content,
            remote_modified_at: parse_remote_time(&file.remote_id, &file.modified_time),
            source_url: file.source_url.clone(),
        };

        if !self.store.would_replace(&doc).await? {
            return Ok(FileOutcome {
                upsert: UpsertOutcome::Unchanged,
                embedded: false,
            });
        }

        // No write transaction is open across the provider call.
        let text = format!("{}\n\n{}", doc.title, doc.content);
        let vector = self.embed(&doc.id, &text).await;

        let mut tx = self.store.begin().await?;
        let upsert = tx.upsert_document(&doc).await?;
        let mut embedded = false;

        if upsert.is_changed() {
            tx.replace_tags(&doc.id, extract_tags(&doc.content)).await?;

            if let Some(vector) = &vector {
                tx.upsert_embedding(&doc.id, vector, self.provider.model_name())
                    .await?;
                embedded = true;
            }
        }

        tx.commit().await?;
        Ok(FileOutcome { upsert, embedded })
    }

    /// Embedding for a changed document, or `None` when it cannot be produced.
    /// Never fails the file.
    async fn embed(&self, document_id: &str, text: &str) -> Option<Vec<f32>> {
        let result = tokio::time::timeout(self.embed_timeout, self.provider.embed(text)).await;
        let vector = match result {
            Ok(Ok(Some(v))) => v,
            Ok(Ok(None)) => {
                debug!(document_id, "empty text, no embedding");
                return None;
            }
            Ok(Err(e)) => {
                warn!(document_id, error = %e, "embedding skipped");
                return None;
            }
            Err(_) => {
                warn!(document_id, "embedding timed out");
                return None;
            }
        };

        let expected = self.provider.dims();
        if expected > 0 && vector.len() != expected {
            warn!(document_id, expected, got = vector.len(), "embedding has wrong dimension, skipped");
            return None;
        }
        Some(vector)
    }
}

struct FileOutcome {
    upsert: UpsertOutcome,
    embedded: bool,
}

/// Parse a remote ISO-8601 time. Unparseable input is logged and treated as
/// unknown.
fn parse_remote_time(remote_id: &str, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(remote_id, raw, error = %e, "unparseable remote modified time");
            None
        }
    }
}
