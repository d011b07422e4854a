//! Core data models for the ingestion pipeline.
//!
//! Types follow the flow of a document through the system:
//! [`RawFile`] → [`SourceDocument`] + [`DocumentMetadata`] → [`ChunkRecord`]
//! (one JSONL line) → [`IndexDocument`] (one index entry with its vector).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Final component of a `/`-separated relative path.
pub fn file_name(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

/// A file a source can supply, before its bytes are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path relative to the source root, `/`-separated.
    pub relative_path: String,
    pub size: u64,
}

impl SourceEntry {
    pub fn file_name(&self) -> &str {
        file_name(&self.relative_path)
    }
}

/// Bytes of one input file, as supplied by a connector.
#[derive(Debug, Clone)]
pub struct RawFile {
    /// Path relative to the connector root, `/`-separated.
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    /// Final path component, e.g. `AC_2025_Portaria_45.pdf`.
    pub fn file_name(&self) -> &str {
        file_name(&self.relative_path)
    }
}

/// One extracted input file. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: String,
    pub raw_text: String,
    pub title: String,
}

/// Structured fields inferred once per document and shared by its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub conhecimento: String,
    pub norma_tipo: String,
    pub orgao_emissor: String,
    pub data_publicacao: Option<NaiveDate>,
    pub ano_letivo: String,
    pub fase_processo: String,
    pub programa: String,
    pub publico_alvo: String,
    pub prazo_inicio: Option<NaiveDate>,
    pub prazo_fim: Option<NaiveDate>,
    pub referencias_legais: Vec<String>,
    pub is_glossario: bool,
}

/// One chunk as written to (and read back from) the knowledge-base JSONL.
///
/// Date fields are kept as the strings found in the file; the record
/// builder decides how they reach the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub id_original: String,
    pub source: String,
    pub source_file: String,
    pub doc_title: String,
    pub assunto: String,
    pub area_interesse: String,
    pub conhecimento: String,
    pub content: String,
    pub text: String,
    pub is_glossario: bool,
    pub chunk: i32,
    pub norma_tipo: String,
    pub orgao_emissor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_publicacao: Option<String>,
    pub ano_letivo: String,
    pub fase_processo: String,
    pub programa: String,
    pub publico_alvo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prazo_inicio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prazo_fim: Option<String>,
    pub referencias_legais: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A record read back from JSONL, with key aliases already resolved.
///
/// `raw_id` is the unencoded identity (`{path}#chunk{n}`); optional dates
/// are kept as found and normalized by the record builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestRecord {
    pub raw_id: String,
    pub text: String,
    pub chunk: i32,
    pub doc_title: String,
    pub source_file: String,
    pub assunto: Option<String>,
    pub area_interesse: Option<String>,
    pub conhecimento: String,
    pub norma_tipo: String,
    pub orgao_emissor: String,
    pub data_publicacao: Option<String>,
    pub ano_letivo: String,
    pub fase_processo: String,
    pub programa: String,
    pub publico_alvo: String,
    pub prazo_inicio: Option<String>,
    pub prazo_fim: Option<String>,
    pub referencias_legais: Vec<String>,
    pub updated_at: Option<String>,
}

/// Index action for a document upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchAction {
    MergeOrUpload,
}

/// A document ready for the search index: record fields plus its vector.
///
/// Optional date fields are omitted when absent, never sent as `null`,
/// because the index types them as `Edm.DateTimeOffset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub id_original: String,
    pub text: String,
    pub content_vector: Vec<f32>,
    pub chunk: i32,
    pub doc_title: String,
    pub source_file: String,
    pub assunto: String,
    pub area_interesse: String,
    pub conhecimento: String,
    pub norma_tipo: String,
    pub orgao_emissor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_publicacao: Option<String>,
    pub ano_letivo: String,
    pub fase_processo: String,
    pub programa: String,
    pub publico_alvo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prazo_inicio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prazo_fim: Option<String>,
    pub referencias_legais: Vec<String>,
    pub updated_at: String,
}

/// Wire form of one entry in an index upload request.
#[derive(Debug, Serialize)]
pub struct IndexAction<'a> {
    #[serde(rename = "@search.action")]
    pub action: SearchAction,
    #[serde(flatten)]
    pub document: &'a IndexDocument,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_path_component() {
        let raw = RawFile {
            relative_path: "portarias/2025/AC_2025.pdf".to_string(),
            bytes: Vec::new(),
        };
        assert_eq!(raw.file_name(), "AC_2025.pdf");
        assert_eq!(file_name("glossario.md"), "glossario.md");
        let entry = SourceEntry {
            relative_path: "a/b/Edital.docx".to_string(),
            size: 1,
        };
        assert_eq!(entry.file_name(), "Edital.docx");
    }

    #[test]
    fn index_action_is_flattened_with_search_action() {
        let doc = IndexDocument {
            id: "YQ".to_string(),
            id_original: "a".to_string(),
            text: "t".to_string(),
            content_vector: vec![0.5],
            chunk: 1,
            doc_title: String::new(),
            source_file: String::new(),
            assunto: String::new(),
            area_interesse: String::new(),
            conhecimento: String::new(),
            norma_tipo: String::new(),
            orgao_emissor: String::new(),
            data_publicacao: None,
            ano_letivo: String::new(),
            fase_processo: String::new(),
            programa: String::new(),
            publico_alvo: String::new(),
            prazo_inicio: Some("2025-03-01T00:00:00Z".to_string()),
            prazo_fim: None,
            referencias_legais: vec![],
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(IndexAction {
            action: SearchAction::MergeOrUpload,
            document: &doc,
        })
        .unwrap();
        assert_eq!(json["@search.action"], "mergeOrUpload");
        assert_eq!(json["id"], "YQ");
        assert_eq!(json["prazo_inicio"], "2025-03-01T00:00:00Z");
        assert!(json.get("data_publicacao").is_none());
        assert!(json.get("prazo_fim").is_none());
    }
}
