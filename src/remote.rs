//! Remote file listing and download.
//!
//! Sync talks to its document source through [`RemoteSource`]. The shipped
//! implementation, [`DirectorySource`], reads a local folder (for example a
//! vault kept in sync by a desktop client); tests plug in in-memory sources.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::RemoteConfig;

/// One entry of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Stable opaque identifier; becomes the document id.
    pub remote_id: String,
    pub name: String,
    /// ISO-8601 text as reported by the remote. Parsed by the sync engine.
    pub modified_time: String,
    pub source_url: Option<String>,
    pub mime_type: String,
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Full listing, in the order files should be processed.
    async fn list(&self) -> Result<Vec<RemoteFile>>;

    /// Raw bytes of one file.
    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>>;
}

/// Whether sync should process this file at all.
pub fn is_markdown(file: &RemoteFile) -> bool {
    let mime = file.mime_type.to_ascii_lowercase();
    matches!(mime.as_str(), "text/markdown" | "text/x-markdown" | "text/plain")
        || file.name.to_ascii_lowercase().ends_with(".md")
}

/// Document title for a file: the name without its `.md` suffix.
pub fn title_for(file: &RemoteFile) -> String {
    let name = file.name.trim();
    let stem = if name.to_ascii_lowercase().ends_with(".md") {
        &name[..name.len() - 3]
    } else {
        name
    };
    let stem = stem.trim();
    if stem.is_empty() {
        format!("Untitled_{}", file.remote_id)
    } else {
        stem.to_string()
    }
}

/// Build the configured source, or `None` when `[remote]` is disabled.
pub fn create_source(config: &RemoteConfig) -> Result<Option<Arc<dyn RemoteSource>>> {
    match config.kind.as_str() {
        "disabled" => Ok(None),
        "directory" => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| anyhow::anyhow!("remote.root must be set for a directory source"))?;
            Ok(Some(Arc::new(DirectorySource::new(root, config)?)))
        }
        other => bail!("Unknown remote kind: {}", other),
    }
}

/// A folder of notes on local disk.
#[derive(Clone)]
pub struct DirectorySource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl DirectorySource {
    pub fn new(root: PathBuf, config: &RemoteConfig) -> Result<Self> {
        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/.obsidian/**".to_string(),
            "**/.trash/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root,
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    fn scan(&self) -> Result<Vec<RemoteFile>> {
        if !self.root.is_dir() {
            bail!("Remote directory does not exist: {}", self.root.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            files.push(file_entry(path, rel_str)?);
        }

        files.sort_by(|a, b| a.remote_id.cmp(&b.remote_id));
        Ok(files)
    }

    /// Resolve a listed id back to a path, refusing anything that escapes the
    /// root.
    fn resolve(&self, remote_id: &str) -> Result<PathBuf> {
        let relative = Path::new(remote_id);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("Refusing path outside remote root: {}", remote_id);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl RemoteSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.scan()).await?
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>> {
        let path = self.resolve(&file.remote_id)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn file_entry(path: &Path, relative: String) -> Result<RemoteFile> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .into();

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(RemoteFile {
        mime_type: guess_mime(&name).to_string(),
        remote_id: relative,
        name,
        modified_time: modified.to_rfc3339_opts(SecondsFormat::Millis, true),
        source_url: Some(format!("file://{}", path.display())),
    })
}

fn guess_mime(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".md") || lower.ends_with(".markdown") {
        "text/markdown"
    } else if lower.ends_with(".txt") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
