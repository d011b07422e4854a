//! TOML configuration with environment overrides.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. the TOML file (`./config/kb.toml` unless `--config` says otherwise),
//! 3. environment variables (a `.env` file is loaded first by `main`).
//!
//! Secrets are never read from the file. API keys come from the environment
//! only and are resolved by [`Config::embedding_api_key`],
//! [`Config::search_api_key`] and [`Config::storage_credentials`], which fail
//! with [`ConfigError::Missing`] as a pre-flight check.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "./config/kb.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub kb: KbConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub blob: BlobConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_target_chars() -> usize {
    1500
}
fn default_overlap() -> usize {
    200
}

/// Labels stamped on every record of a knowledge base.
#[derive(Debug, Deserialize, Clone)]
pub struct KbConfig {
    #[serde(default = "default_assunto")]
    pub assunto: String,
    #[serde(default = "default_area_interesse")]
    pub area_interesse: String,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            assunto: default_assunto(),
            area_interesse: default_area_interesse(),
        }
    }
}

fn default_assunto() -> String {
    "atribuicao".to_string()
}
fn default_area_interesse() -> String {
    "conhecimento".to_string()
}

/// Which source files `kb build` picks up.
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Files larger than this are skipped as extraction failures.
    #[serde(default = "default_max_extract_bytes")]
    pub max_extract_bytes: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_extract_bytes: default_max_extract_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["pdf", "docx", "txt", "md", "csv", "log"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}
fn default_max_extract_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `azure` (Azure OpenAI deployment) or `openai` (public API).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Azure OpenAI deployment name.
    #[serde(default = "default_model")]
    pub deployment: String,
    /// Public OpenAI model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Azure OpenAI resource endpoint. Unused by the public API.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_embedding_api_version")]
    pub api_version: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            deployment: default_model(),
            model: default_model(),
            endpoint: None,
            api_version: default_embedding_api_version(),
            dims: default_dims(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "azure".to_string()
}
fn default_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_embedding_api_version() -> String {
    "2024-10-21".to_string()
}
fn default_dims() -> usize {
    3072
}
fn default_batch_size() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_search_api_version")]
    pub api_version: String,
    #[serde(default = "default_analyzer")]
    pub analyzer: String,
    #[serde(default = "default_semantic_configuration")]
    pub semantic_configuration: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            index: default_index(),
            api_version: default_search_api_version(),
            analyzer: default_analyzer(),
            semantic_configuration: default_semantic_configuration(),
        }
    }
}

fn default_index() -> String {
    "kb-atribuicao".to_string()
}
fn default_search_api_version() -> String {
    "2023-11-01".to_string()
}
fn default_analyzer() -> String {
    "pt-BR.microsoft".to_string()
}
fn default_semantic_configuration() -> String {
    "kb-atribuicao-semantic".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BlobConfig {
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Overrides `https://{account}.blob.core.windows.net` (Azurite, sovereign clouds).
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Shared Key credentials for blob storage.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl EmbeddingConfig {
    pub fn is_azure(&self) -> bool {
        self.provider == "azure"
    }

    /// Deployment or model name sent to the selected provider.
    pub fn model_name(&self) -> &str {
        if self.is_azure() {
            &self.deployment
        } else {
            &self.model
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicitly given path must exist. When `path` is `None` the
    /// default path is read if present, otherwise built-in defaults apply.
    /// Environment overrides are applied; callers run [`Config::validate`]
    /// once their own overrides are in.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// The lookup is injected so tests don't have to mutate the process
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TARGET_CHARS") {
            self.chunking.target_chars = parse_number("TARGET_CHARS", &v)?;
        }
        if let Some(v) = get("OVERLAP") {
            self.chunking.overlap = parse_number("OVERLAP", &v)?;
        }
        if let Some(v) = get("ASSUNTO") {
            self.kb.assunto = v;
        }
        if let Some(v) = get("AREA_INTERESSE") {
            self.kb.area_interesse = v;
        }
        if let Some(v) = get("PROVIDER") {
            self.embedding.provider = v;
        }
        if let Some(v) = get("AOAI_ENDPOINT") {
            self.embedding.endpoint = Some(v);
        }
        if let Some(v) = get("AOAI_EMB_DEPLOYMENT") {
            self.embedding.deployment = v;
        }
        if let Some(v) = get("OPENAI_EMB_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("AOAI_API_VERSION") {
            self.embedding.api_version = v;
        }
        if let Some(v) = get("EMB_DIM") {
            self.embedding.dims = parse_number("EMB_DIM", &v)?;
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.embedding.batch_size = parse_number("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("SEARCH_ENDPOINT") {
            self.search.endpoint = Some(v);
        }
        if let Some(v) = get("SEARCH_INDEX") {
            self.search.index = v;
        }
        if let Some(v) = get("SEARCH_API_VERSION") {
            self.search.api_version = v;
        }
        if let Some(v) = get("AZURE_STORAGE_ACCOUNT") {
            self.blob.account_name = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.target_chars == 0 {
            return Err(ConfigError::Invalid(
                "chunking.target_chars must be > 0".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.target_chars {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_chars ({})",
                self.chunking.overlap, self.chunking.target_chars
            )));
        }
        if self.embedding.dims == 0 {
            return Err(ConfigError::Invalid("embedding.dims must be > 0".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be >= 1".to_string(),
            ));
        }
        match self.embedding.provider.as_str() {
            "azure" | "openai" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown embedding provider: '{}'. Must be azure or openai.",
                    other
                )))
            }
        }
        if self.search.index.trim().is_empty() {
            return Err(ConfigError::Invalid("search.index must not be empty".to_string()));
        }
        Ok(())
    }

    /// API key for the configured embedding provider (`AOAI_KEY` or `OPENAI_API_KEY`).
    pub fn embedding_api_key(&self) -> Result<String, ConfigError> {
        let var = if self.embedding.is_azure() {
            "AOAI_KEY"
        } else {
            "OPENAI_API_KEY"
        };
        require_env(var)
    }

    pub fn search_endpoint(&self) -> Result<&str, ConfigError> {
        self.search
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("search.endpoint (SEARCH_ENDPOINT)".to_string()))
    }

    pub fn search_api_key(&self) -> Result<String, ConfigError> {
        require_env("SEARCH_API_KEY")
    }

    pub fn storage_credentials(&self) -> Result<StorageCredentials, ConfigError> {
        let account_name = self
            .blob
            .account_name
            .clone()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Missing("blob.account_name (AZURE_STORAGE_ACCOUNT)".to_string())
            })?;
        let account_key = require_env("AZURE_STORAGE_KEY")?;
        Ok(StorageCredentials {
            account_name,
            account_key,
        })
    }
}

fn require_env(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(format!("{} environment variable", var)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.target_chars, 1500);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.embedding.dims, 3072);
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.search.api_version, "2023-11-01");
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
[chunking]
target_chars = 1200
overlap = 150

[embedding]
provider = "openai"
dims = 1536
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.target_chars, 1200);
        assert_eq!(config.chunking.overlap, 150);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.kb.assunto, "atribuicao");
    }

    #[test]
    fn overlap_must_be_smaller_than_target() {
        let mut config = Config::default();
        config.chunking.overlap = config.chunking.target_chars;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn zero_target_is_rejected() {
        let mut config = Config::default();
        config.chunking.target_chars = 0;
        config.chunking.overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = Config::default();
        config.embedding.provider = "cohere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("TARGET_CHARS", "1000"),
                ("OVERLAP", "100"),
                ("EMB_DIM", "1536"),
                ("SEARCH_ENDPOINT", "https://example.search.windows.net"),
                ("AOAI_EMB_DEPLOYMENT", "emb-large"),
            ]))
            .unwrap();
        assert_eq!(config.chunking.target_chars, 1000);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.embedding.deployment, "emb-large");
        assert_eq!(config.embedding.model_name(), "emb-large");
        assert_eq!(
            config.search_endpoint().unwrap(),
            "https://example.search.windows.net"
        );
    }

    #[test]
    fn openai_model_env_applies_only_to_openai() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("PROVIDER", "openai"),
                ("OPENAI_EMB_MODEL", "text-embedding-3-small"),
                ("AOAI_EMB_DEPLOYMENT", "ignored"),
            ]))
            .unwrap();
        assert_eq!(config.embedding.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn provider_switch_after_env_uses_that_providers_model() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("AOAI_EMB_DEPLOYMENT", "my-aoai-deploy"),
                ("OPENAI_EMB_MODEL", "text-embedding-3-small"),
            ]))
            .unwrap();
        assert_eq!(config.embedding.model_name(), "my-aoai-deploy");

        config.embedding.provider = "openai".to_string();
        config.validate().unwrap();
        assert_eq!(config.embedding.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn load_leaves_validation_to_the_caller() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kb.toml");
        std::fs::write(&path, "[chunking]\ntarget_chars = 200\noverlap = 300\n").unwrap();

        let mut config = Config::load(Some(&path)).unwrap();
        assert!(config.validate().is_err());

        config.chunking.overlap = 10;
        config.validate().unwrap();
    }

    #[test]
    fn bad_numeric_env_is_invalid() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("BATCH_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_search_endpoint_is_reported() {
        let config = Config::default();
        let err = config.search_endpoint().unwrap_err();
        assert!(err.to_string().contains("SEARCH_ENDPOINT"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here/kb.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
