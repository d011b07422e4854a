//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and its two backends:
//! - **[`AzureOpenAIProvider`]**: an Azure OpenAI deployment
//!   (`{endpoint}/openai/deployments/{deployment}/embeddings?api-version=...`,
//!   `api-key` header).
//! - **[`OpenAIProvider`]**: the public OpenAI API
//!   (`POST https://api.openai.com/v1/embeddings`, bearer token, `model` in
//!   the body).
//!
//! # Provider Selection
//!
//! [`create_provider`] picks the backend once from `embedding.provider`;
//! nothing downstream branches on the provider again.
//!
//! # Failure Policy
//!
//! There is no retry. Any non-2xx response becomes
//! [`ProviderError::Http`] with the status and body verbatim, and a
//! transport failure or timeout becomes [`ProviderError::Transport`].

use anyhow::Result;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ConfigError, ProviderError};

/// Outbound request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Trait for embedding providers.
///
/// `embed` returns exactly one vector per input, in input order. Vector
/// length is checked by the caller against the configured dimension.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model or deployment identifier.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

// ============ Azure OpenAI Provider ============

/// Embedding provider backed by an Azure OpenAI deployment.
pub struct AzureOpenAIProvider {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl AzureOpenAIProvider {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        );
        Ok(Self {
            http: http_client()?,
            url,
            api_key,
            deployment: deployment.to_string(),
        })
    }
}

impl EmbeddingProvider for AzureOpenAIProvider {
    fn model_name(&self) -> &str {
        &self.deployment
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({ "input": texts });
        let request = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body);
        send_embeddings(request, texts.len())
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the public OpenAI API.
pub struct OpenAIProvider {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(model: &str, api_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model.to_string(),
        })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .http
            .post(OPENAI_EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        send_embeddings(request, texts.len())
    }
}

fn http_client() -> Result<reqwest::blocking::Client, ProviderError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

fn send_embeddings(
    request: reqwest::blocking::RequestBuilder,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let response = request.send()?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ProviderError::Http {
            status: status.as_u16(),
            body,
        });
    }
    let json: serde_json::Value = response.json()?;
    parse_embeddings_response(&json, expected)
}

/// Parse an embeddings response (`{"data": [{"embedding": [...], "index": n}]}`).
///
/// Items are reordered by `index` when every item carries one. The number
/// of vectors must equal `expected`.
pub fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProviderError::InvalidResponse("missing data array".to_string()))?;

    let mut items: Vec<(Option<u64>, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!("item {} has no embedding", position))
            })?;
        let vector = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!(
                    "item {} has a non-numeric embedding value",
                    position
                ))
            })?;
        let index = item.get("index").and_then(|i| i.as_u64());
        items.push((index, vector));
    }

    if items.len() != expected {
        return Err(ProviderError::CountMismatch {
            expected,
            actual: items.len(),
        });
    }

    if items.iter().all(|(index, _)| index.is_some()) {
        items.sort_by_key(|(index, _)| *index);
    }

    Ok(items.into_iter().map(|(_, v)| v).collect())
}

/// Create the [`EmbeddingProvider`] selected by `embedding.provider`.
///
/// | Config Value | Provider | Secret |
/// |-------------|----------|--------|
/// | `"azure"` | [`AzureOpenAIProvider`] | `AOAI_KEY` |
/// | `"openai"` | [`OpenAIProvider`] | `OPENAI_API_KEY` |
///
/// # Errors
///
/// Returns a [`ConfigError`] when the Azure endpoint or the API key is
/// missing; both are checked before any request is made.
pub fn create_provider(config: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "azure" => {
            let endpoint = embedding
                .endpoint
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| {
                    ConfigError::Missing("embedding.endpoint (AOAI_ENDPOINT)".to_string())
                })?;
            let api_key = config.embedding_api_key()?;
            Ok(Box::new(AzureOpenAIProvider::new(
                endpoint,
                embedding.model_name(),
                &embedding.api_version,
                api_key,
            )?))
        }
        "openai" => {
            let api_key = config.embedding_api_key()?;
            Ok(Box::new(OpenAIProvider::new(embedding.model_name(), api_key)?))
        }
        other => Err(ConfigError::Invalid(format!("unknown embedding provider: '{}'", other)).into()),
    }
}
