//! Error taxonomy for the ingestion pipeline.
//!
//! Fatal errors ([`ConfigError`], [`ProviderError`], [`IndexServiceError`],
//! [`BlobError`]) abort the command that raised them. [`ParseError`] is
//! recovered locally by the JSONL reader, which skips the offending line.
//! Extraction failures live in [`crate::extract::ExtractError`] and are
//! recovered by skipping the file.
//!
//! Every variant that wraps an upstream HTTP failure keeps the status code
//! and response body verbatim so operators can diagnose the service.

use thiserror::Error;

/// Missing or invalid configuration, detected before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure of the embedding provider, or a response the pipeline cannot use.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error(
        "embedding dimension mismatch at position {position}: expected {expected}, got {actual} \
         (check embedding.dims / EMB_DIM against the deployed model)"
    )]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        position: usize,
    },
}

/// Failure of the search index service (schema, upload or delete).
#[derive(Debug, Error)]
pub enum IndexServiceError {
    #[error("index {operation} failed with HTTP {status}: {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("index request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("index rejected {} document(s): {}", .0.len(), .0.join("; "))]
    Rejected(Vec<String>),
}

/// A malformed line in a JSONL record file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: expected a JSON object")]
    NotAnObject { line: usize },

    #[error("line {line}: record has neither `id` nor `id_original`")]
    MissingId { line: usize },
}

/// Failure talking to blob storage.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob {operation} failed with HTTP {status}: {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("blob request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storage account key is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),

    #[error("invalid blob listing response: {0}")]
    Listing(String),
}
