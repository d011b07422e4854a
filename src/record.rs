//! Record building and identity.
//!
//! Two conversions live here:
//! - chunks of one [`SourceDocument`] → [`ChunkRecord`]s (one JSONL line each);
//! - an [`IngestRecord`] read back from JSONL plus its vector → [`IndexDocument`].
//!
//! # Identity
//!
//! `id_original` is `"{relative_path}#chunk{n}"` with `n` starting at 1.
//! The index key is the URL-safe, unpadded base64 of its UTF-8 bytes, so
//! any path (spaces, accents, `/`) becomes a valid document key and
//! re-running on the same input yields the same keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::config::KbConfig;
use crate::models::{ChunkRecord, DocumentMetadata, IndexDocument, IngestRecord, SourceDocument};

/// `"{relative_path}#chunk{chunk_index}"`.
pub fn id_original_for(relative_path: &str, chunk_index: usize) -> String {
    format!("{}#chunk{}", relative_path, chunk_index)
}

/// Index key for a raw identity.
pub fn encode_id(id_original: &str) -> String {
    URL_SAFE_NO_PAD.encode(id_original.as_bytes())
}

/// Inverse of [`encode_id`]; `None` if `id` is not a key it produced.
pub fn decode_id(id: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(id).ok()?;
    String::from_utf8(bytes).ok()
}

/// One record per chunk, numbered from 1, sharing the document's metadata.
pub fn build_chunk_records(
    doc: &SourceDocument,
    meta: &DocumentMetadata,
    chunks: &[String],
    kb: &KbConfig,
) -> Vec<ChunkRecord> {
    let iso = |d: Option<NaiveDate>| d.map(|d| d.format("%Y-%m-%d").to_string());

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let index = i + 1;
            let id = id_original_for(&doc.path, index);
            ChunkRecord {
                id: id.clone(),
                id_original: id,
                source: doc.path.clone(),
                source_file: doc.path.clone(),
                doc_title: doc.title.clone(),
                assunto: kb.assunto.clone(),
                area_interesse: kb.area_interesse.clone(),
                conhecimento: meta.conhecimento.clone(),
                content: chunk.clone(),
                text: chunk.clone(),
                is_glossario: meta.is_glossario,
                chunk: i32::try_from(index).unwrap_or(i32::MAX),
                norma_tipo: meta.norma_tipo.clone(),
                orgao_emissor: meta.orgao_emissor.clone(),
                data_publicacao: iso(meta.data_publicacao),
                ano_letivo: meta.ano_letivo.clone(),
                fase_processo: meta.fase_processo.clone(),
                programa: meta.programa.clone(),
                publico_alvo: meta.publico_alvo.clone(),
                prazo_inicio: iso(meta.prazo_inicio),
                prazo_fim: iso(meta.prazo_fim),
                referencias_legais: meta.referencias_legais.clone(),
                updated_at: None,
            }
        })
        .collect()
}

/// Merge a JSONL record with its vector into an index document.
///
/// `kb` supplies `assunto`/`area_interesse` when the record has none, and
/// `now` is the `updated_at` of records without a usable timestamp.
pub fn to_index_document(
    record: &IngestRecord,
    vector: Vec<f32>,
    kb: &KbConfig,
    now: DateTime<Utc>,
) -> IndexDocument {
    let optional = |v: &Option<String>| v.as_deref().and_then(normalize_datetime);

    IndexDocument {
        id: encode_id(&record.raw_id),
        id_original: record.raw_id.clone(),
        text: record.text.clone(),
        content_vector: vector,
        chunk: record.chunk,
        doc_title: record.doc_title.clone(),
        source_file: record.source_file.clone(),
        assunto: record
            .assunto
            .clone()
            .unwrap_or_else(|| kb.assunto.clone()),
        area_interesse: record
            .area_interesse
            .clone()
            .unwrap_or_else(|| kb.area_interesse.clone()),
        conhecimento: record.conhecimento.clone(),
        norma_tipo: record.norma_tipo.clone(),
        orgao_emissor: record.orgao_emissor.clone(),
        data_publicacao: optional(&record.data_publicacao),
        ano_letivo: record.ano_letivo.clone(),
        fase_processo: record.fase_processo.clone(),
        programa: record.programa.clone(),
        publico_alvo: record.publico_alvo.clone(),
        prazo_inicio: optional(&record.prazo_inicio),
        prazo_fim: optional(&record.prazo_fim),
        referencias_legais: record.referencias_legais.clone(),
        updated_at: optional(&record.updated_at)
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Normalize a date or timestamp to an RFC 3339 UTC string.
///
/// Accepts RFC 3339 timestamps (any offset), naive `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC) and bare `YYYY-MM-DD` dates (midnight UTC). Anything else
/// yields `None`.
pub fn normalize_datetime(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
