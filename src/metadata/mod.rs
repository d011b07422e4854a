//! Heuristic metadata for Portuguese education-administration documents.
//!
//! Every field is derived from the file name and extracted text only; no
//! external lookups. Extraction never fails: an unknown field is the empty
//! string (or `None` for dates), except `conhecimento` and `publico_alvo`
//! which have explicit defaults.
//!
//! Keyword tables live in [`rules`]; date and deadline parsing in [`dates`].

pub mod dates;
pub mod rules;

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::DocumentMetadata;
use rules::{fold, first_match, Refine};

pub use dates::{guess_data_publicacao, guess_prazos};

/// `conhecimento` when no rule matches.
pub const DEFAULT_CONHECIMENTO: &str = "Geral";

/// Lines scanned for a normative heading.
const TITLE_SCAN_LINES: usize = 15;
const TITLE_MAX_CHARS: usize = 150;

static PHASE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fase\s*([0-9]+)").expect("valid regex"));

static LEGAL_REFERENCES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)(Resolu\w+.*?)\b([0-9]{1,4})/(20[1-4][0-9])").expect("valid regex"),
        Regex::new(r"(?i)(Portaria.*?)\b([0-9]{1,4})/(20[1-4][0-9])").expect("valid regex"),
        Regex::new(r"(?i)(Lei Complementar.*?)\b([0-9]{1,4})/(20[0-9]{2}|19[0-9]{2})")
            .expect("valid regex"),
    ]
});

const REFERENCE_MIN_CHARS: usize = 6;
const REFERENCE_MAX_CHARS: usize = 140;

/// Run every extractor over one document.
pub fn extract_metadata(text: &str, file_name: &str) -> DocumentMetadata {
    let (prazo_inicio, prazo_fim) = guess_prazos(text);
    DocumentMetadata {
        conhecimento: infer_conhecimento(text, file_name),
        norma_tipo: guess_norma_tipo(text, file_name),
        orgao_emissor: guess_orgao_emissor(text),
        data_publicacao: guess_data_publicacao(text),
        ano_letivo: guess_ano_letivo(text, file_name),
        fase_processo: guess_fase_processo(text, file_name),
        programa: guess_programa(text),
        publico_alvo: guess_publico_alvo(text),
        prazo_inicio,
        prazo_fim,
        referencias_legais: extract_referencias_legais(text),
        is_glossario: is_glossario(file_name),
    }
}

/// Knowledge area: file-name prefix, then file-name keywords, then body phrases.
pub fn infer_conhecimento(text: &str, file_name: &str) -> String {
    let name = fold(file_name);
    first_match(rules::CONHECIMENTO_PREFIX_RULES, &name)
        .or_else(|| first_match(rules::CONHECIMENTO_NAME_RULES, &name))
        .or_else(|| first_match(rules::CONHECIMENTO_BODY_RULES, &fold(text)))
        .unwrap_or(DEFAULT_CONHECIMENTO)
        .to_string()
}

pub fn guess_norma_tipo(text: &str, file_name: &str) -> String {
    let haystack = fold(&format!("{}\n{}", file_name, text));
    first_match(rules::NORMA_TIPO_RULES, &haystack)
        .unwrap_or_default()
        .to_string()
}

pub fn guess_orgao_emissor(text: &str) -> String {
    first_match(rules::ORGAO_EMISSOR_RULES, &fold(text))
        .unwrap_or_default()
        .to_string()
}

/// Academic year: a year in the file name wins over the latest year in the body.
pub fn guess_ano_letivo(text: &str, file_name: &str) -> String {
    dates::plausible_years(file_name)
        .next()
        .or_else(|| dates::plausible_years(text).max())
        .map(|y| y.to_string())
        .unwrap_or_default()
}

pub fn guess_fase_processo(text: &str, file_name: &str) -> String {
    let haystack = fold(&format!("{}\n{}", file_name, text));
    let Some(phase) = rules::FASE_PROCESSO_RULES
        .iter()
        .find(|p| p.when.matches(&haystack))
    else {
        return String::new();
    };

    match phase.refine {
        Refine::None => phase.label.to_string(),
        Refine::Variants(variants) => first_match(variants, &haystack)
            .unwrap_or(phase.label)
            .to_string(),
        Refine::PhaseNumber => match PHASE_NUMBER.captures(&haystack) {
            Some(caps) => format!("{} – Fase {}", phase.label, &caps[1]),
            None => phase.label.to_string(),
        },
    }
}

pub fn guess_programa(text: &str) -> String {
    first_match(rules::PROGRAMA_RULES, &fold(text))
        .unwrap_or_default()
        .to_string()
}

/// Sorted, comma-joined audience tags.
pub fn guess_publico_alvo(text: &str) -> String {
    let haystack = fold(text);
    let tags: BTreeSet<&str> = rules::PUBLICO_ALVO_RULES
        .iter()
        .filter(|r| r.when.matches(&haystack))
        .map(|r| r.label)
        .collect();
    if !tags.is_empty() {
        return tags.into_iter().collect::<Vec<_>>().join(", ");
    }
    first_match(rules::PUBLICO_ALVO_FALLBACK, &haystack)
        .unwrap_or(rules::PUBLICO_ALVO_DEFAULT)
        .to_string()
}

/// Citations of resolutions, ordinances and complementary laws, deduplicated
/// and sorted.
pub fn extract_referencias_legais(text: &str) -> Vec<String> {
    let mut refs = BTreeSet::new();
    for re in LEGAL_REFERENCES.iter() {
        for m in re.find_iter(text) {
            let found = m.as_str().trim();
            let len = found.chars().count();
            if (REFERENCE_MIN_CHARS..=REFERENCE_MAX_CHARS).contains(&len) {
                refs.insert(found.to_string());
            }
        }
    }
    refs.into_iter().collect()
}

/// Title for a document: the first normative heading near the top of the
/// text, else `fallback` (usually the file stem).
pub fn detect_title(text: &str, fallback: &str) -> String {
    text.lines()
        .take(TITLE_SCAN_LINES)
        .map(str::trim)
        .find(|line| {
            let folded = fold(line);
            line.chars().count() < TITLE_MAX_CHARS
                && ["resolucao", "portaria", "decreto"]
                    .iter()
                    .any(|k| folded.contains(k))
        })
        .unwrap_or(fallback)
        .to_string()
}

/// Glossary documents are flagged by name.
pub fn is_glossario(file_name: &str) -> bool {
    fold(file_name).contains("glossario")
}
