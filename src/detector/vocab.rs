//! Keyword sets driving detection and reconciliation.
//!
//! All terms are lowercase and matched as substrings of lowercased text.
//! Bump `VOCAB_VERSION` whenever a list changes so stored reports can be
//! traced back to the rules that produced them.

pub const VOCAB_VERSION: u32 = 1;

/// A code hit is only trusted in fallback mode if its surroundings carry one of these.
pub const CONFIRMING: &[&str] = &[
    "convenio colectivo",
    "acuerdo laboral",
    "registro, depósito y publicación",
    "convenio de empresa",
    "acuerdo de empresa",
    "pacto de empresa",
    "revisión salarial",
    "fuerza de ventas",
];

/// Administrative notices that share vocabulary with labor agreements.
pub const EXCLUDING: &[&str] = &[
    "convocatoria",
    "provisión de puestos",
    "libre designación",
    "concurso de méritos",
    "pruebas selectivas",
    "funcionarios",
    "oposiciones",
    "subvenciones",
    "formalización del contrato",
    "anuncio periódico",
    "convenio de colaboración",
    "convenio de ejecución",
    "convenio ayuda infraestructuras",
    "convenio específico",
    "plan estratégico",
];

/// Wording that suggests a revision even when the code is unchanged.
pub const CHANGE_INDICATORS: &[&str] = &[
    "modificación",
    "revisión",
    "actualización",
    "prórroga",
    "extensión",
    "ampliación",
    "cambio",
    "nuevo",
    "corrección",
    "registro",
    "depósito",
    "publicación",
    "acuerdo",
];

/// Stored descriptions mentioning these point at an agreement with limited validity.
pub const TEMPORARY_VALIDITY: &[&str] = &["temporal", "provisional", "transitorio", "vigencia", "hasta"];

#[derive(Debug, Clone, Copy)]
pub struct Vocabularies {
    pub confirming: &'static [&'static str],
    pub excluding: &'static [&'static str],
    pub change_indicators: &'static [&'static str],
    pub temporary_validity: &'static [&'static str],
}

impl Vocabularies {
    pub const fn standard() -> Self {
        Self {
            confirming: CONFIRMING,
            excluding: EXCLUDING,
            change_indicators: CHANGE_INDICATORS,
            temporary_validity: TEMPORARY_VALIDITY,
        }
    }
}

impl Default for Vocabularies {
    fn default() -> Self {
        Self::standard()
    }
}

/// First term of `terms` found in `lowered`, if any. `lowered` must already be lowercase.
pub fn first_match<'a>(lowered: &str, terms: &[&'a str]) -> Option<&'a str> {
    terms.iter().copied().find(|t| lowered.contains(t))
}

pub fn contains_any(lowered: &str, terms: &[&str]) -> bool {
    first_match(lowered, terms).is_some()
}
