use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{CodeHostSource, Tenant, WorkspaceSource};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Data-plane host of the vector index, e.g. the index endpoint URL.
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// First-run lookback window when no checkpoint exists yet.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_concurrency() -> usize {
    4
}
fn default_lookback_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct TenantConfig {
    #[serde(default)]
    pub workspace: Option<WorkspaceSourceConfig>,
    #[serde(default)]
    pub codehost: Option<CodeHostSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceSourceConfig {
    pub database_id: String,
    /// Defaults to `{tenant}-workspace`.
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodeHostSourceConfig {
    pub owner: String,
    pub repo: String,
    /// Defaults to `{tenant}-codehost`.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Config {
    /// Resolve a tenant id into a [`Tenant`] with namespaces filled in.
    ///
    /// Called once at request or sync entry; the resulting value is threaded
    /// explicitly through the pipeline.
    pub fn resolve_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        let tc = self.tenants.get(tenant_id).ok_or_else(|| {
            Error::InvalidConfig(format!("unknown tenant '{}'", tenant_id))
        })?;

        let workspace = tc.workspace.as_ref().map(|ws| WorkspaceSource {
            database_id: ws.database_id.clone(),
            namespace: ws
                .namespace
                .clone()
                .unwrap_or_else(|| format!("{}-workspace", tenant_id)),
        });

        let codehost = tc.codehost.as_ref().map(|ch| CodeHostSource {
            owner: ch.owner.clone(),
            repo: ch.repo.clone(),
            namespace: ch
                .namespace
                .clone()
                .unwrap_or_else(|| format!("{}-codehost", tenant_id)),
        });

        Ok(Tenant {
            id: tenant_id.to_string(),
            workspace,
            codehost,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("failed to parse config file: {}", e)))?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        return Err(Error::InvalidConfig(
            "chunking.max_chars must be > 0".to_string(),
        ));
    }
    if config.chunking.overlap >= config.chunking.max_chars {
        return Err(Error::InvalidConfig(format!(
            "chunking.overlap ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap, config.chunking.max_chars
        )));
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        return Err(Error::InvalidConfig(
            "retrieval.top_k must be >= 1".to_string(),
        ));
    }

    // Validate embedding
    if config.embedding.dimension == 0 {
        return Err(Error::InvalidConfig(
            "embedding.dimension must be > 0".to_string(),
        ));
    }
    if config.embedding.batch_size == 0 {
        return Err(Error::InvalidConfig(
            "embedding.batch_size must be > 0".to_string(),
        ));
    }

    // Validate sync
    if config.sync.max_concurrency == 0 {
        return Err(Error::InvalidConfig(
            "sync.max_concurrency must be > 0".to_string(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> String {
        r#"
[db]
path = "/tmp/waypoint.sqlite"

[chunking]
max_chars = 500
overlap = 50

[embedding]
model = "text-embedding-3-small"
dimension = 1024

[completion]
model = "gpt-4o-mini"

[index]
base_url = "https://example-index.svc.pinecone.io"

[tenants.acme.workspace]
database_id = "db-123"

[tenants.acme.codehost]
owner = "acme"
repo = "platform"
namespace = "acme-code"
"#
        .to_string()
    }

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = parse(&minimal_toml()).unwrap();
        assert_eq!(config.chunking.max_chars, 500);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.sync.max_concurrency, 4);
        assert_eq!(config.embedding.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_resolve_tenant_defaults_namespace() {
        let config = parse(&minimal_toml()).unwrap();
        let tenant = config.resolve_tenant("acme").unwrap();
        let ws = tenant.workspace.unwrap();
        assert_eq!(ws.namespace, "acme-workspace");
        let ch = tenant.codehost.unwrap();
        assert_eq!(ch.namespace, "acme-code");
    }

    #[test]
    fn test_resolve_unknown_tenant() {
        let config = parse(&minimal_toml()).unwrap();
        let err = config.resolve_tenant("nobody").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max_chars() {
        let toml_str = minimal_toml().replace("overlap = 50", "overlap = 500");
        let tmp = std::env::temp_dir().join("waypoint-bad-chunking.toml");
        std::fs::write(&tmp, toml_str).unwrap();
        let err = load_config(&tmp).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        std::fs::remove_file(&tmp).ok();
    }
}
