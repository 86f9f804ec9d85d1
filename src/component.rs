use serde::{Deserialize, Serialize};

use crate::iupac_code::validate_sequence;

/// Category of a biological part. Closed for matching purposes; seed rows
/// with an unrecognized category land in `Misc` rather than failing the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Promoter,
    Cds,
    Terminator,
    Ori,
    Resistance,
    Primer,
    Recombination,
    Misc,
    SignalPeptide,
}

impl Category {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "promoter" => Category::Promoter,
            "cds" | "gene" | "coding" => Category::Cds,
            "terminator" => Category::Terminator,
            "ori" | "origin" | "rep_origin" => Category::Ori,
            "resistance" | "marker" => Category::Resistance,
            "primer" | "primer_bind" => Category::Primer,
            "recombination" => Category::Recombination,
            "signal_peptide" => Category::SignalPeptide,
            _ => Category::Misc,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Promoter => "promoter",
            Category::Cds => "cds",
            Category::Terminator => "terminator",
            Category::Ori => "ori",
            Category::Resistance => "resistance",
            Category::Primer => "primer",
            Category::Recombination => "recombination",
            Category::Misc => "misc",
            Category::SignalPeptide => "signal_peptide",
        }
    }

    /// Display color for hits of this category on a sequence map.
    pub fn color(&self) -> &'static str {
        match self {
            Category::Promoter => "#31a354",
            Category::Cds => "#3182bd",
            Category::Terminator => "#e6550d",
            Category::Ori => "#756bb1",
            Category::Resistance => "#de2d26",
            Category::Primer => "#636363",
            Category::Recombination => "#c51b8a",
            Category::Misc => "#9a9ba3",
            Category::SignalPeptide => "#74c476",
        }
    }
}

/// A known biological part: origin of replication, antibiotic resistance
/// gene, promoter, terminator, coding sequence, purification tag and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Store-assigned identifier, stable for the lifetime of the store.
    pub id: i64,
    /// Human-readable name, eg "AmpR" or "T7 promoter". Not unique.
    pub name: String,
    /// Part category, also the source of the display color.
    pub category: Category,
    /// Uppercase nucleotide sequence. Immutable once stored.
    pub sequence: String,
    /// Sequence length in base pairs; always equals `sequence.len()`.
    pub length: usize,
    pub description: Option<String>,
    pub organism: Option<String>,
    /// Whether this part ships with the application or was added by the user.
    pub is_builtin: bool,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        sequence: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let sequence: String = sequence.into().to_uppercase();
        if sequence.is_empty() {
            anyhow::bail!("Component sequence must not be empty");
        }
        if let Err((pos, letter)) = validate_sequence(sequence.as_bytes()) {
            anyhow::bail!(
                "Component sequence has invalid letter '{}' at position {pos}",
                letter as char
            );
        }
        let length = sequence.len();
        Ok(Self {
            id: 0,
            name: name.into(),
            category,
            sequence,
            length,
            description: None,
            organism: None,
            is_builtin: false,
        })
    }
}
