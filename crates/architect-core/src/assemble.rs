use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{AttributeSet, ImageAttributes, ImageField, PromptKind, TextAttributes};

/// Value of `_meta.generator` in every export.
pub const GENERATOR: &str = "PromptArchitect";

/// Join the trimmed, non-empty image values in priority order.
pub fn assemble_image(attrs: &ImageAttributes) -> String {
    ImageField::PRIORITY
        .iter()
        .map(|f| attrs.get(*f).trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lay out the labeled sections of a text prompt. Sections whose values
/// are blank are left out entirely.
pub fn assemble_text(attrs: &TextAttributes) -> String {
    fn present(v: &str) -> bool {
        !v.trim().is_empty()
    }

    let mut out = String::new();

    if present(&attrs.purpose) {
        out.push_str(&format!("Task: {}.\n", attrs.purpose));
    }
    if present(&attrs.context) {
        out.push_str(&format!("Context: {}\n", attrs.context));
    }
    if present(&attrs.audience) {
        out.push_str(&format!("Target Audience: {}.\n", attrs.audience));
    }

    let requirements: Vec<(&str, &str)> = [
        ("Style", attrs.writing_style.as_str()),
        ("Tone", attrs.tone.as_str()),
        ("Length", attrs.length.as_str()),
    ]
    .into_iter()
    .filter(|(_, v)| present(v))
    .collect();
    if !requirements.is_empty() {
        out.push_str("\nOutput Requirements:\n");
        for (label, value) in requirements {
            out.push_str(&format!("- {}: {}\n", label, value));
        }
    }

    if present(&attrs.additional_instructions) {
        out.push_str("\nAdditional Instructions:\n");
        out.push_str(&attrs.additional_instructions);
    }

    out.trim().to_string()
}

impl AttributeSet {
    /// The natural-language prompt for the current selections.
    pub fn assemble(&self) -> String {
        match self {
            AttributeSet::Image(a) => assemble_image(a),
            AttributeSet::Text(a) => assemble_text(a),
        }
    }

    /// Canonical machine-readable form, stamped with `generated_at`.
    pub fn export(&self, generated_at: DateTime<Utc>) -> PromptExport {
        PromptExport {
            meta: ExportMeta {
                generator: GENERATOR.to_string(),
                kind: self.kind().as_str().to_string(),
                timestamp: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            prompt: self.assemble(),
            parameters: self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub generator: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
}

/// The JSON export artifact. Field names are what downstream consumers read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExport {
    #[serde(rename = "_meta")]
    pub meta: ExportMeta,
    pub prompt: String,
    pub parameters: AttributeSet,
}

impl PromptExport {
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn kind(&self) -> PromptKind {
        self.parameters.kind()
    }
}

/// Character and word counts of an assembled prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptStats {
    pub chars: usize,
    pub words: usize,
}

impl PromptStats {
    pub fn of(text: &str) -> Self {
        Self {
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
        }
    }
}
