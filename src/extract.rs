//! Text extraction for the input formats (PDF, DOCX, plain text).
//!
//! Connectors supply a [`RawFile`]; this module returns plain UTF-8 text or
//! an [`ExtractError`], which the build command treats as "skip this file".
//! PDF and DOCX support are cargo features (`pdf`, `docx`); [`Capabilities`]
//! reports what this binary was compiled with.

#[cfg(feature = "docx")]
use std::io::Read;

use tracing::warn;

use crate::models::RawFile;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
#[cfg(feature = "docx")]
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// A PDF yielding fewer non-whitespace characters than this is probably a scan.
pub const SCANNED_PDF_THRESHOLD: usize = 100;

/// Extraction error. Never fatal: the caller skips the file.
#[derive(Debug)]
pub enum ExtractError {
    Unsupported(String),
    Disabled(&'static str),
    TooLarge { size: u64, limit: u64 },
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Unsupported(ext) => write!(f, "unsupported file type: {}", ext),
            ExtractError::Disabled(feature) => write!(
                f,
                "{} support not compiled in (rebuild with --features {})",
                feature, feature
            ),
            ExtractError::TooLarge { size, limit } => {
                write!(f, "file is {} bytes, limit is {} bytes", size, limit)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Input formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Text,
}

impl FileKind {
    pub fn from_path(path: &str) -> Option<FileKind> {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "docx" => Some(FileKind::Docx),
            "txt" | "md" | "csv" | "log" => Some(FileKind::Text),
            _ => None,
        }
    }
}

/// Extractors compiled into this binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pdf: bool,
    pub docx: bool,
}

impl Capabilities {
    pub fn current() -> Self {
        Self {
            pdf: cfg!(feature = "pdf"),
            docx: cfg!(feature = "docx"),
        }
    }

    pub fn supports(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Pdf => self.pdf,
            FileKind::Docx => self.docx,
            FileKind::Text => true,
        }
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |on: bool| if on { "yes" } else { "no" };
        write!(
            f,
            "pdf={} docx={} text=yes",
            flag(self.pdf),
            flag(self.docx)
        )
    }
}

/// Extract the text of one input file, refusing files over `max_bytes`.
pub fn extract_file(file: &RawFile, max_bytes: u64) -> Result<String, ExtractError> {
    let size = file.bytes.len() as u64;
    if size > max_bytes {
        return Err(ExtractError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let kind = FileKind::from_path(&file.relative_path).ok_or_else(|| {
        ExtractError::Unsupported(
            file.relative_path
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_default(),
        )
    })?;

    let text = extract_text(&file.bytes, kind)?;

    if kind == FileKind::Pdf {
        let visible = text.chars().filter(|c| !c.is_whitespace()).count();
        if visible < SCANNED_PDF_THRESHOLD {
            warn!(
                file = %file.relative_path,
                chars = visible,
                "little text extracted from PDF; it is probably scanned and needs OCR"
            );
        }
    }

    Ok(text)
}

/// Extracts plain text from file content of a known kind.
pub fn extract_text(bytes: &[u8], kind: FileKind) -> Result<String, ExtractError> {
    match kind {
        FileKind::Pdf => extract_pdf(bytes),
        FileKind::Docx => extract_docx(bytes),
        FileKind::Text => Ok(decode_text(bytes)),
    }
}

/// UTF-8 with invalid sequences dropped and any BOM removed.
fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_start_matches('\u{feff}')
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}

#[cfg(feature = "pdf")]
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::Disabled("pdf"))
}

#[cfg(not(feature = "docx"))]
fn extract_docx(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::Disabled("docx"))
}

#[cfg(feature = "docx")]
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Ooxml("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_body_text(&doc_xml)
}

/// Walks `word/document.xml`: one line per non-empty paragraph, one
/// `| a | b |` line per table row with content.
#[cfg(feature = "docx")]
fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_t = false;
    // Open tables; each holds the row being built and the cell being built.
    let mut tables: Vec<(Vec<String>, String)> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"tbl" => tables.push((Vec::new(), String::new())),
                b"tr" => {
                    if let Some((row, _)) = tables.last_mut() {
                        row.clear();
                    }
                }
                b"tc" => {
                    if let Some((_, cell)) = tables.last_mut() {
                        cell.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push(' '),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let text = std::mem::take(&mut paragraph);
                    let text = text.trim();
                    if !text.is_empty() {
                        match tables.last_mut() {
                            Some((_, cell)) => append_spaced(cell, text),
                            None => lines.push(text.to_string()),
                        }
                    }
                }
                b"tc" => {
                    if let Some((row, cell)) = tables.last_mut() {
                        row.push(std::mem::take(cell));
                    }
                }
                b"tr" => {
                    let line = match tables.last_mut() {
                        Some((row, _)) if row.iter().any(|c| !c.is_empty()) => {
                            Some(format!("| {} |", std::mem::take(row).join(" | ")))
                        }
                        _ => None,
                    };
                    if let Some(line) = line {
                        // Rows of a nested table land in the enclosing cell.
                        match tables.len() {
                            depth if depth > 1 => append_spaced(&mut tables[depth - 2].1, &line),
                            _ => lines.push(line),
                        }
                    }
                }
                b"tbl" => {
                    tables.pop();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(lines.join("\n"))
}

#[cfg(feature = "docx")]
fn append_spaced(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(path: &str, bytes: &[u8]) -> RawFile {
        RawFile {
            relative_path: path.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_path("a/B.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_path("x.docx"), Some(FileKind::Docx));
        assert_eq!(FileKind::from_path("notes.md"), Some(FileKind::Text));
        assert_eq!(FileKind::from_path("run.log"), Some(FileKind::Text));
        assert_eq!(FileKind::from_path("image.png"), None);
        assert_eq!(FileKind::from_path("README"), None);
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_file(&raw("foo.bin", b"foo"), 1024).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(ref e) if e == "bin"));
    }

    #[test]
    fn oversized_file_is_refused() {
        let err = extract_file(&raw("big.txt", &[b'a'; 64]), 10).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 64, limit: 10 }));
    }

    #[test]
    fn text_is_decoded_lossily() {
        let mut bytes = "\u{feff}Atribuição ".as_bytes().to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"ok");
        let text = extract_file(&raw("a.txt", &bytes), 1024).unwrap();
        assert_eq!(text, "Atribuição ok");
    }

    #[test]
    fn capabilities_follow_features() {
        let caps = Capabilities::current();
        assert_eq!(caps.pdf, cfg!(feature = "pdf"));
        assert_eq!(caps.docx, cfg!(feature = "docx"));
        assert!(caps.supports(FileKind::Text));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", FileKind::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[cfg(feature = "docx")]
    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", FileKind::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[cfg(feature = "docx")]
    #[test]
    fn docx_paragraphs_and_tables() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>RESOLU&#199;&#195;O SEDUC</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Artigo </w:t></w:r><w:r><w:t>1</w:t></w:r></w:p>
<w:p></w:p>
<w:tbl>
<w:tr><w:tc><w:p><w:r><w:t>Fase</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Prazo</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p/></w:tc><w:tc><w:p/></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>Inscri&#231;&#227;o</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>01/03 a 15/03</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
<w:p><w:r><w:t>Fim</w:t></w:r></w:p>
</w:body>
</w:document>"#;
        let text = docx_body_text(xml).unwrap();
        assert_eq!(
            text,
            "RESOLUÇÃO SEDUC\nArtigo 1\n| Fase | Prazo |\n| Inscrição | 01/03 a 15/03 |\nFim"
        );
    }
}
