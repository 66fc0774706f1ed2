//! Shared fixtures: an in-memory remote, a counting embedding provider, and
//! an `AppContext` over a temp directory.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use vault_index::app::AppContext;
use vault_index::config::{parse_config, Config};
use vault_index::embedding::EmbeddingProvider;
use vault_index::remote::{RemoteFile, RemoteSource};

pub const DIMS: usize = 4;
pub const MODEL: &str = "fake-model";

/// Words that get their own axis in [`FakeProvider`] vectors.
const AXES: [&str; 3] = ["rust", "python", "garden"];

/// Deterministic bag-of-words embeddings over [`AXES`] plus a constant bias
/// component. Counts calls.
#[derive(Default)]
pub struct FakeProvider {
    calls: AtomicUsize,
    failing: Mutex<bool>,
    gate: Mutex<Option<EmbedGate>>,
}

/// Pauses the next `embed` call: `entered` fires once the call is inside the
/// provider, which then waits for `release`.
#[derive(Clone)]
pub struct EmbedGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn hold_next_embed(&self) -> EmbedGate {
        let gate = EmbedGate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

pub fn fake_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
    {
        if let Some(axis) = AXES.iter().position(|a| *a == word) {
            v[axis] += 1.0;
        }
    }
    v[DIMS - 1] = 0.01;
    v
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn model_name(&self) -> &str {
        MODEL
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if *self.failing.lock().unwrap() {
            bail!("embedding backend unavailable");
        }
        Ok(Some(fake_vector(text)))
    }
}

/// Remote whose listing and contents are set by the test.
#[derive(Default)]
pub struct FakeSource {
    files: Mutex<Vec<RemoteFile>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    broken: Mutex<HashSet<String>>,
    list_fails: Mutex<bool>,
    gate: Mutex<Option<Arc<Notify>>>,
    downloads: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add or replace a markdown file.
    pub fn put(&self, id: &str, name: &str, modified: &str, content: &str) {
        self.put_typed(id, name, modified, content, "text/markdown");
    }

    pub fn put_typed(&self, id: &str, name: &str, modified: &str, content: &str, mime: &str) {
        self.put_raw(id, name, modified, content.as_bytes().to_vec(), mime);
    }

    /// Add or replace a markdown file with arbitrary bytes as its content.
    pub fn put_bytes(&self, id: &str, name: &str, modified: &str, content: Vec<u8>) {
        self.put_raw(id, name, modified, content, "text/markdown");
    }

    fn put_raw(&self, id: &str, name: &str, modified: &str, content: Vec<u8>, mime: &str) {
        let file = RemoteFile {
            remote_id: id.to_string(),
            name: name.to_string(),
            modified_time: modified.to_string(),
            source_url: Some(format!("https://remote.example/{}", id)),
            mime_type: mime.to_string(),
        };
        let mut files = self.files.lock().unwrap();
        match files.iter_mut().find(|f| f.remote_id == id) {
            Some(existing) => *existing = file,
            None => files.push(file),
        }
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), content);
    }

    /// Make downloads of `id` fail.
    pub fn break_download(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_listing(&self, fails: bool) {
        *self.list_fails.lock().unwrap() = fails;
    }

    /// Block `list()` until the returned handle is notified.
    pub fn hold_listing(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.list_fails.lock().unwrap() {
            bail!("remote rejected credentials");
        }
        Ok(self.files.lock().unwrap().clone())
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.broken.lock().unwrap().contains(&file.remote_id) {
            bail!("connection reset while downloading {}", file.remote_id);
        }
        match self.contents.lock().unwrap().get(&file.remote_id) {
            Some(c) => Ok(c.clone()),
            None => bail!("no such file: {}", file.remote_id),
        }
    }
}

pub fn test_config(root: &Path) -> Config {
    parse_config(&format!(
        r#"
[db]
path = "{root}/data/vault.sqlite"

[index]
dir = "{root}/data/index"
dims = {DIMS}

[retrieval]
default_k = 3
max_k = 10
"#,
        root = root.display()
    ))
    .unwrap()
}

pub async fn build_context(
    root: &Path,
    provider: Arc<dyn EmbeddingProvider>,
    source: Option<Arc<dyn RemoteSource>>,
) -> AppContext {
    let config = test_config(root);
    let pool = vault_index::db::connect(&config).await.unwrap();
    AppContext::from_parts(config, pool, provider, source)
        .await
        .unwrap()
}
