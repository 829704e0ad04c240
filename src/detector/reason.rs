use serde::{Serialize, Serializer};

/// Kind of change a summary entry announces, judged from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    CodeModification,
    NewRegistration,
    Extension,
    Update,
    Correction,
    NewResolution,
    Generic,
}

impl ChangeReason {
    /// First keyword hit wins, in this order.
    pub fn classify(text: &str) -> Self {
        let t = text.to_lowercase();
        if t.contains("modificación") || t.contains("cambio") {
            Self::CodeModification
        } else if t.contains("registro") && t.contains("depósito") {
            Self::NewRegistration
        } else if t.contains("prórroga") || t.contains("extensión") {
            Self::Extension
        } else if t.contains("actualización") {
            Self::Update
        } else if t.contains("corrección") {
            Self::Correction
        } else if t.contains("resolución") {
            Self::NewResolution
        } else {
            Self::Generic
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::CodeModification => "Modificación de código",
            Self::NewRegistration => "Nuevo registro/depósito",
            Self::Extension => "Prórroga/Extensión",
            Self::Update => "Actualización",
            Self::Correction => "Corrección",
            Self::NewResolution => "Nueva resolución",
            Self::Generic => "Cambio detectado",
        }
    }
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ChangeReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}
