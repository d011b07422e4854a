//! Ordered keyword rule tables.
//!
//! Every table is evaluated top to bottom and the first matching rule wins.
//! More specific patterns sit above the patterns they contain ("portaria
//! conjunta" above "portaria"), so reordering a table changes results:
//! each rule has its own test below.
//!
//! Needles are lowercase and accent-free. Haystacks go through [`fold`]
//! first, so "Resolução", "RESOLUCAO" and "resolução" all match `resolucao`.

/// Condition evaluated against a folded haystack.
#[derive(Debug, Clone, Copy)]
pub enum Cond {
    /// Haystack starts with one of the prefixes.
    Prefix(&'static [&'static str]),
    /// Haystack contains at least one needle.
    Any(&'static [&'static str]),
    /// Haystack contains every needle.
    All(&'static [&'static str]),
    /// Haystack contains the needle with no letter or digit on either side.
    Word(&'static str),
}

impl Cond {
    pub fn matches(&self, haystack: &str) -> bool {
        match self {
            Cond::Prefix(prefixes) => prefixes.iter().any(|p| haystack.starts_with(p)),
            Cond::Any(needles) => needles.iter().any(|n| haystack.contains(n)),
            Cond::All(needles) => needles.iter().all(|n| haystack.contains(n)),
            Cond::Word(word) => contains_word(haystack, word),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub when: Cond,
    pub label: &'static str,
}

const fn rule(when: Cond, label: &'static str) -> Rule {
    Rule { when, label }
}

/// Label of the first rule that matches, if any.
pub fn first_match(rules: &[Rule], haystack: &str) -> Option<&'static str> {
    rules
        .iter()
        .find(|r| r.when.matches(haystack))
        .map(|r| r.label)
}

/// Refinement applied once a process phase has matched.
#[derive(Debug, Clone, Copy)]
pub enum Refine {
    None,
    /// First matching variant replaces the base label.
    Variants(&'static [Rule]),
    /// Append the number captured by `fase\s*(\d+)`.
    PhaseNumber,
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseRule {
    pub when: Cond,
    pub label: &'static str,
    pub refine: Refine,
}

const fn phase(when: Cond, label: &'static str, refine: Refine) -> PhaseRule {
    PhaseRule {
        when,
        label,
        refine,
    }
}

pub const AC: &str = "Atribuição de Classes (AC)";
pub const AD: &str = "Avaliação de Desempenho (AD)";
pub const CP: &str = "Confirmação de Participação (CP)";
pub const PEI: &str = "Programa Ensino Integral (PEI)";

/// File-name prefixes, checked first.
pub const CONHECIMENTO_PREFIX_RULES: &[Rule] = &[
    rule(Cond::Prefix(&["at"]), AC),
    rule(Cond::Prefix(&["ac"]), AC),
    rule(Cond::Prefix(&["ad"]), AD),
    rule(Cond::Prefix(&["cp"]), CP),
    rule(Cond::Prefix(&["pei"]), PEI),
];

/// Keywords anywhere in the file name, checked after prefixes.
pub const CONHECIMENTO_NAME_RULES: &[Rule] = &[
    rule(Cond::Any(&["atribui"]), AC),
    rule(Cond::Any(&["avaliaca", "desempenho"]), AD),
    rule(Cond::All(&["confirmacao", "participacao"]), CP),
    rule(Cond::Any(&["ensino integral", "ensino_integral"]), PEI),
];

/// Phrases in the document body, checked last.
pub const CONHECIMENTO_BODY_RULES: &[Rule] = &[
    rule(Cond::Any(&["atribuicao de classes"]), AC),
    rule(Cond::Any(&["avaliacao de desempenho"]), AD),
    rule(Cond::Any(&["confirmacao de participacao"]), CP),
    rule(Cond::Any(&["programa ensino integral"]), PEI),
];

pub const NORMA_TIPO_RULES: &[Rule] = &[
    rule(Cond::Any(&["portaria conjunta"]), "Portaria Conjunta"),
    rule(Cond::Any(&["portaria"]), "Portaria"),
    rule(Cond::Any(&["resolucao"]), "Resolução"),
    rule(Cond::Any(&["comunicado"]), "Comunicado"),
    rule(Cond::Any(&["informacao"]), "Informação"),
    rule(Cond::Any(&["decreto"]), "Decreto"),
    rule(Cond::Any(&["lei complementar"]), "Lei Complementar"),
];

/// Joint issuance outranks any single agency.
pub const ORGAO_EMISSOR_RULES: &[Rule] = &[
    rule(Cond::All(&["sucor", "suped"]), "SUCOR/SUPED"),
    rule(Cond::Any(&["cgrh"]), "CGRH"),
    rule(Cond::Any(&["dipes"]), "DIPES"),
    rule(Cond::Any(&["sucor"]), "SUCOR"),
    rule(Cond::Any(&["suped"]), "SUPED"),
    rule(Cond::Any(&["seduc"]), "SEDUC"),
];

pub const PROGRAMA_RULES: &[Rule] = &[
    rule(Cond::Any(&["programa ensino integral"]), "PEI"),
    rule(Cond::Word("pei"), "PEI"),
    rule(Cond::Any(&["ensino integral"]), "PEI"),
    rule(Cond::Any(&["tempo parcial"]), "Tempo Parcial"),
    rule(Cond::Word("eja"), "EJA"),
    rule(Cond::Any(&["ensino tecnico", "novotec"]), "Ensino Técnico / Novotec"),
];

/// Audience tags are independent: every matching rule contributes.
pub const PUBLICO_ALVO_RULES: &[Rule] = &[
    rule(Cond::Any(&["docente", "professor"]), "Docentes"),
    rule(Cond::Any(&["diretor", "gestor", "coordenador"]), "Gestores"),
    rule(Cond::Any(&["candidato", "contratado"]), "Candidatos/Contratados"),
];

/// Used when no audience tag matched.
pub const PUBLICO_ALVO_FALLBACK: &[Rule] = &[rule(Cond::Word("pei"), "PEI")];
pub const PUBLICO_ALVO_DEFAULT: &str = "Geral";

const ALOCACAO_VARIANTS: &[Rule] = &[rule(Cond::Any(&["inicial"]), "Alocação Inicial")];
const TRANSFERENCIA_VARIANTS: &[Rule] = &[rule(Cond::Word("pei"), "Transferência PEI")];
const AVALIACAO_VARIANTS: &[Rule] = &[
    rule(Cond::Any(&["final"]), "Avaliação de Desempenho Final"),
    rule(Cond::Any(&["parcial"]), "Avaliação de Desempenho Parcial"),
];

/// Process phases. "alocacao" is matched as a word so that "realocacao"
/// reaches its own rule.
pub const FASE_PROCESSO_RULES: &[PhaseRule] = &[
    phase(
        Cond::Any(&["conferencia de dados"]),
        "Conferência de Dados",
        Refine::None,
    ),
    phase(Cond::Any(&["credenciamento"]), "Credenciamento", Refine::None),
    phase(
        Cond::Word("alocacao"),
        "Alocação",
        Refine::Variants(ALOCACAO_VARIANTS),
    ),
    phase(Cond::Word("realocacao"), "Realocação", Refine::None),
    phase(
        Cond::Any(&["transferencia"]),
        "Transferência",
        Refine::Variants(TRANSFERENCIA_VARIANTS),
    ),
    phase(
        Cond::Any(&["confirmacao de participacao"]),
        "Confirmação de Participação",
        Refine::PhaseNumber,
    ),
    phase(Cond::Any(&["classificacao"]), "Classificação", Refine::None),
    phase(
        Cond::Any(&["inscricao", "inscricoes"]),
        "Inscrição",
        Refine::None,
    ),
    phase(
        Cond::Any(&["avaliacao de desempenho"]),
        "Avaliação de Desempenho",
        Refine::Variants(AVALIACAO_VARIANTS),
    ),
];

/// Lowercase and strip Portuguese diacritics.
pub fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
