//! Knowledge-base JSONL files.
//!
//! `kb build` writes one [`ChunkRecord`] per line (UTF-8, non-ASCII kept
//! as-is). `kb ingest` reads lines back into [`IngestRecord`]s, accepting
//! the key aliases older files use (`id|id_original`, `text|content`,
//! `doc_title|title`, `source_file|source`). Empty strings and `null` count
//! as absent, so an alias is consulted when the preferred key is blank.
//!
//! Blank lines are ignored. Malformed lines are skipped with a warning and
//! counted; they never abort the read.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ParseError;
use crate::models::{ChunkRecord, IngestRecord};

/// Serialize records, one JSON object per line.
pub fn write_records<W: Write>(mut writer: W, records: &[ChunkRecord]) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Write records to `path`, creating parent directories.
pub fn write_jsonl_file(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_records(std::io::BufWriter::new(file), records)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Result of reading a JSONL document.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub records: Vec<IngestRecord>,
    /// Malformed lines that were skipped.
    pub skipped: usize,
}

/// Parse every line of `content`, skipping blank and malformed lines.
pub fn parse_jsonl(content: &str) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(i + 1, line) {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                warn!("skipping JSONL record: {}", e);
                outcome.skipped += 1;
            }
        }
    }
    outcome
}

/// Read a JSONL file from disk. Invalid UTF-8 is replaced, not fatal.
pub fn read_jsonl_file(path: &Path) -> Result<ReadOutcome> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_jsonl(&String::from_utf8_lossy(&bytes)))
}

/// Loosely typed view of one line; values are interpreted leniently below.
#[derive(Debug, Deserialize)]
struct RawRecord {
    id: Option<Value>,
    id_original: Option<Value>,
    text: Option<Value>,
    content: Option<Value>,
    doc_title: Option<Value>,
    title: Option<Value>,
    source_file: Option<Value>,
    source: Option<Value>,
    chunk: Option<Value>,
    assunto: Option<Value>,
    area_interesse: Option<Value>,
    conhecimento: Option<Value>,
    norma_tipo: Option<Value>,
    orgao_emissor: Option<Value>,
    data_publicacao: Option<Value>,
    ano_letivo: Option<Value>,
    fase_processo: Option<Value>,
    programa: Option<Value>,
    publico_alvo: Option<Value>,
    prazo_inicio: Option<Value>,
    prazo_fim: Option<Value>,
    referencias_legais: Option<Value>,
    updated_at: Option<Value>,
}

/// Parse one non-blank line (`line` is 1-based, for error messages).
pub fn parse_line(line: usize, text: &str) -> Result<IngestRecord, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|source| ParseError::Json { line, source })?;
    if !value.is_object() {
        return Err(ParseError::NotAnObject { line });
    }
    let raw: RawRecord =
        serde_json::from_value(value).map_err(|source| ParseError::Json { line, source })?;

    let raw_id = first_text(&[&raw.id, &raw.id_original]);
    if raw_id.is_empty() {
        return Err(ParseError::MissingId { line });
    }

    Ok(IngestRecord {
        raw_id,
        text: first_text(&[&raw.text, &raw.content]),
        chunk: chunk_number(&raw.chunk),
        doc_title: first_text(&[&raw.doc_title, &raw.title]),
        source_file: first_text(&[&raw.source_file, &raw.source]),
        assunto: text_of(&raw.assunto),
        area_interesse: text_of(&raw.area_interesse),
        conhecimento: first_text(&[&raw.conhecimento]),
        norma_tipo: first_text(&[&raw.norma_tipo]),
        orgao_emissor: first_text(&[&raw.orgao_emissor]),
        data_publicacao: text_of(&raw.data_publicacao),
        ano_letivo: first_text(&[&raw.ano_letivo]),
        fase_processo: first_text(&[&raw.fase_processo]),
        programa: first_text(&[&raw.programa]),
        publico_alvo: first_text(&[&raw.publico_alvo]),
        prazo_inicio: text_of(&raw.prazo_inicio),
        prazo_fim: text_of(&raw.prazo_fim),
        referencias_legais: string_list(&raw.referencias_legais),
        updated_at: text_of(&raw.updated_at),
    })
}

/// Scalar as text; `null`, `false`, `""` and containers count as absent.
fn text_of(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

fn first_text(candidates: &[&Option<Value>]) -> String {
    candidates
        .iter()
        .find_map(|v| text_of(v))
        .unwrap_or_default()
}

fn chunk_number(value: &Option<Value>) -> i32 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn string_list(value: &Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| text_of(&Some(v.clone())))
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
