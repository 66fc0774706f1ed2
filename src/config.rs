//! TOML configuration.
//!
//! Every section maps onto a `Deserialize` struct. Optional keys fall back to
//! the `default_*` helpers below, and [`load_config`] rejects combinations the
//! engine cannot run with.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the snapshot artifacts.
    pub dir: PathBuf,
    /// Admitted vector dimension. Defaults to `embedding.dims` and must equal
    /// it when a provider is enabled.
    #[serde(default)]
    pub dims: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_kind")]
    pub kind: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: default_remote_kind(),
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_remote_kind() -> String {
    "disabled".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: default_download_timeout(),
            embed_timeout_secs: default_embed_timeout(),
        }
    }
}

fn default_download_timeout() -> u64 {
    60
}
fn default_embed_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_lexical_limit")]
    pub lexical_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
            lexical_limit: default_lexical_limit(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_max_k() -> usize {
    50
}
fn default_lexical_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed browser origin; any origin when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origin: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

impl Config {
    /// Vector dimension the index admits, if one is configured.
    pub fn index_dims(&self) -> Option<usize> {
        self.index.dims.or(self.embedding.dims).filter(|d| *d > 0)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.default_k == 0 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    if config.retrieval.max_k < config.retrieval.default_k {
        anyhow::bail!("retrieval.max_k must be >= retrieval.default_k");
    }
    if config.retrieval.lexical_limit < 1 {
        anyhow::bail!("retrieval.lexical_limit must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if let (Some(index_dims), Some(embedding_dims)) = (config.index.dims, config.embedding.dims) {
            if index_dims != embedding_dims {
                anyhow::bail!(
                    "index.dims ({}) must match embedding.dims ({})",
                    index_dims,
                    embedding_dims
                );
            }
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.remote.kind.as_str() {
        "disabled" => {}
        "directory" => {
            if config.remote.root.is_none() {
                anyhow::bail!("remote.root must be set when remote.kind is 'directory'");
            }
        }
        other => anyhow::bail!(
            "Unknown remote kind: '{}'. Must be disabled or directory.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/vault.sqlite"

[index]
dir = "./data/index"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.remote.kind, "disabled");
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.sync.download_timeout_secs, 60);
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert_eq!(config.index_dims(), None);
    }

    #[test]
    fn enabled_provider_requires_dims_and_model() {
        let toml = format!("{MINIMAL}\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let toml = format!("{MINIMAL}\n[embedding]\nprovider = \"openai\"\ndims = 8\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let toml = format!("{MINIMAL}\n[embedding]\nprovider = \"magic\"\n");
        assert!(parse_config(&toml).is_err());

        let toml = format!("{MINIMAL}\n[remote]\nkind = \"ftp\"\n");
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn directory_remote_requires_root() {
        let toml = format!("{MINIMAL}\n[remote]\nkind = \"directory\"\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("remote.root"));
    }

    const WITH_DIMS: &str = r#"
[db]
path = "db.sqlite"

[index]
dir = "idx"
dims = 4

[embedding]
model = "nomic-embed-text"
dims = 768
"#;

    #[test]
    fn index_dims_take_precedence_when_provider_disabled() {
        let config = parse_config(WITH_DIMS).unwrap();
        assert_eq!(config.index_dims(), Some(4));
    }

    #[test]
    fn enabled_provider_rejects_mismatched_index_dims() {
        let toml = WITH_DIMS.replace("[embedding]\n", "[embedding]\nprovider = \"ollama\"\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("must match embedding.dims"));

        let toml = toml.replace("dims = 4", "dims = 768");
        assert_eq!(parse_config(&toml).unwrap().index_dims(), Some(768));
    }

    #[test]
    fn example_config_parses() {
        let config = parse_config(include_str!("../config/vidx.example.toml")).unwrap();
        assert_eq!(config.remote.kind, "directory");
        assert_eq!(config.remote.include_globs, vec!["**/*.md", "**/*.txt"]);
    }
}
