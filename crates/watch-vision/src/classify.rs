use image::Rgb;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Drowning,
    Swimming,
    OutOfWater,
    Unknown,
}

// Compared against the lowercased raw label, exact match only.
static SYNONYMS: &[(&str, Classification)] = &[
    ("drowning", Classification::Drowning),
    ("drown", Classification::Drowning),
    ("swimming", Classification::Swimming),
    ("out of water", Classification::OutOfWater),
];

impl Classification {
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        SYNONYMS
            .iter()
            .find(|(syn, _)| *syn == lower)
            .map(|(_, c)| *c)
            .unwrap_or(Classification::Unknown)
    }

    pub fn is_drowning(self) -> bool {
        self == Classification::Drowning
    }

    /// Overlay text; `None` for labels we do not draw.
    pub fn display_text(self) -> Option<&'static str> {
        match self {
            Classification::Drowning => Some("Drowning"),
            Classification::Swimming => Some("Swimming"),
            Classification::OutOfWater => Some("Out of Water"),
            Classification::Unknown => None,
        }
    }

    pub fn color(self) -> Option<Rgb<u8>> {
        match self {
            Classification::Drowning => Some(Rgb([255, 0, 0])),
            Classification::Swimming => Some(Rgb([0, 255, 0])),
            Classification::OutOfWater => Some(Rgb([0, 0, 255])),
            Classification::Unknown => None,
        }
    }
}

/// True when at least one class name in the table maps to `Drowning`.
pub fn table_can_report_drowning(class_names: &[String]) -> bool {
    class_names.iter().any(|n| Classification::from_label(n).is_drowning())
}
