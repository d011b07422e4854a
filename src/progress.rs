//! Build and upsert progress reporting.
//!
//! Reports observable progress during `kb build` (files extracted) and
//! `kb ingest` (batches embedded and uploaded). Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::pipeline::BatchState;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A source is being listed. Total unknown.
    Discovering { source: String },
    /// `n` files processed out of `total`.
    Extracting { source: String, n: u64, total: u64 },
    /// A batch changed state.
    Batch {
        batch: usize,
        total: usize,
        state: BatchState,
        records_done: u64,
        records_total: u64,
    },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  batch 3 / 12  uploading  32 / 190 records".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { source } => {
                format!("build {}  discovering...\n", source)
            }
            ProgressEvent::Extracting { source, n, total } => format!(
                "build {}  extracting  {} / {} files\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Batch {
                batch,
                total,
                state,
                records_done,
                records_total,
            } => {
                // Pending is immediately followed by Embedding; one line is enough.
                if *state == BatchState::Pending {
                    return;
                }
                format!(
                    "ingest  batch {} / {}  {}  {} / {} records\n",
                    batch,
                    total,
                    state.as_str(),
                    format_number(*records_done),
                    format_number(*records_total)
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "discovering"
            }),
            ProgressEvent::Extracting { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "extracting",
                "n": n,
                "total": total
            }),
            ProgressEvent::Batch {
                batch,
                total,
                state,
                records_done,
                records_total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "upsert",
                "batch": batch,
                "batches": total,
                "state": state.as_str(),
                "n": records_done,
                "total": records_total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
