//! Embed-and-upsert batch pipeline.
//!
//! Records are split into batches of `batch_size`. Each batch moves
//! through [`BatchState`]:
//!
//! ```text
//! Pending ──▶ Embedding ──▶ Uploading ──▶ Done
//!                 │             │
//!                 └─────────────┴──▶ Failed
//! ```
//!
//! Batches run strictly one after another. The first failure stops the run
//! and is returned with its batch number; batches already `Done` stay in
//! the index, and a re-run upserts them again under the same keys. Every
//! vector is checked against the configured dimension before the batch is
//! uploaded, so a misconfigured model never writes partial data.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::config::KbConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexServiceError, ProviderError};
use crate::index::SearchIndex;
use crate::models::IngestRecord;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::record::to_index_document;

/// Lifecycle of one batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchState {
    Pending,
    Embedding,
    Uploading,
    Done,
    Failed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Pending => "pending",
            BatchState::Embedding => "embedding",
            BatchState::Uploading => "uploading",
            BatchState::Done => "done",
            BatchState::Failed => "failed",
        }
    }
}

/// A failed batch. `batch` is 1-based.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch {batch} of {total}: embedding failed")]
    Provider {
        batch: usize,
        total: usize,
        #[source]
        source: ProviderError,
    },

    #[error("batch {batch} of {total}: upload failed")]
    Index {
        batch: usize,
        total: usize,
        #[source]
        source: IndexServiceError,
    },
}

impl PipelineError {
    pub fn batch(&self) -> usize {
        match self {
            PipelineError::Provider { batch, .. } | PipelineError::Index { batch, .. } => *batch,
        }
    }
}

/// Counts reported after a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub records: usize,
    pub batches: usize,
    pub uploaded: usize,
}

pub struct UpsertPipeline<'a> {
    provider: &'a dyn EmbeddingProvider,
    index: &'a dyn SearchIndex,
    kb: &'a KbConfig,
    dims: usize,
    batch_size: usize,
    progress: &'a dyn ProgressReporter,
}

impl<'a> UpsertPipeline<'a> {
    /// `batch_size` below 1 is treated as 1.
    pub fn new(
        provider: &'a dyn EmbeddingProvider,
        index: &'a dyn SearchIndex,
        kb: &'a KbConfig,
        dims: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            index,
            kb,
            dims,
            batch_size: batch_size.max(1),
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Run every batch, stamping `updated_at` fallbacks with the current time.
    pub fn run(&self, records: &[IngestRecord]) -> Result<UpsertSummary, PipelineError> {
        self.run_at(records, Utc::now())
    }

    /// Run every batch with a fixed run timestamp.
    pub fn run_at(
        &self,
        records: &[IngestRecord],
        now: DateTime<Utc>,
    ) -> Result<UpsertSummary, PipelineError> {
        let total = records.len().div_ceil(self.batch_size);
        let mut summary = UpsertSummary {
            records: records.len(),
            batches: total,
            uploaded: 0,
        };
        let mut sent = 0usize;

        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            let number = i + 1;
            let report = |state: BatchState, sent: usize| {
                self.progress.report(ProgressEvent::Batch {
                    batch: number,
                    total,
                    state,
                    records_done: sent as u64,
                    records_total: records.len() as u64,
                })
            };

            report(BatchState::Pending, sent);
            report(BatchState::Embedding, sent);
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let vectors = match self.embed_checked(&texts) {
                Ok(v) => v,
                Err(source) => {
                    report(BatchState::Failed, sent);
                    return Err(PipelineError::Provider {
                        batch: number,
                        total,
                        source,
                    });
                }
            };

            report(BatchState::Uploading, sent);
            let docs: Vec<_> = batch
                .iter()
                .zip(vectors)
                .map(|(record, vector)| to_index_document(record, vector, self.kb, now))
                .collect();
            match self.index.merge_or_upload(&docs) {
                Ok(accepted) => summary.uploaded += accepted,
                Err(source) => {
                    report(BatchState::Failed, sent);
                    return Err(PipelineError::Index {
                        batch: number,
                        total,
                        source,
                    });
                }
            }

            sent += batch.len();
            debug!(batch = number, total, sent, "batch uploaded");
            report(BatchState::Done, sent);
        }

        Ok(summary)
    }

    fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let vectors = self.provider.embed(texts)?;
        if vectors.len() != texts.len() {
            return Err(ProviderError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        check_dimensions(&vectors, self.dims)?;
        Ok(vectors)
    }
}

/// Every vector must have exactly `dims` components.
pub fn check_dimensions(vectors: &[Vec<f32>], dims: usize) -> Result<(), ProviderError> {
    match vectors.iter().position(|v| v.len() != dims) {
        Some(position) => Err(ProviderError::DimensionMismatch {
            expected: dims,
            actual: vectors[position].len(),
            position,
        }),
        None => Ok(()),
    }
}
