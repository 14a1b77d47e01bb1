pub mod assemble;
pub mod error;
pub mod storage;
pub mod templates;

pub use assemble::{ExportMeta, PromptExport, PromptStats, GENERATOR};
pub use error::{CoreError, Result};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use templates::{Template, TemplateStore, TEMPLATES_KEY};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

// --- Types ---

/// Kind of prompt. Written uppercase; lowercase is also accepted when reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PromptKind {
    #[serde(alias = "image")]
    Image,
    #[serde(alias = "text")]
    Text,
}

impl PromptKind {
    /// Lowercase name used in the export `_meta.type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Image => "image",
            PromptKind::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Some(PromptKind::Image),
            "text" => Some(PromptKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys of an image attribute set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageField {
    MainSubject,
    Environment,
    TimeOfDay,
    ArtStyle,
    Mood,
    Lighting,
    ColorPalette,
    CameraAngle,
    ShotType,
    DepthOfField,
    Resolution,
    AspectRatio,
}

impl ImageField {
    /// Assembly order: important details first.
    pub const PRIORITY: [ImageField; 12] = [
        ImageField::MainSubject,
        ImageField::Environment,
        ImageField::TimeOfDay,
        ImageField::ArtStyle,
        ImageField::Mood,
        ImageField::Lighting,
        ImageField::ColorPalette,
        ImageField::CameraAngle,
        ImageField::ShotType,
        ImageField::DepthOfField,
        ImageField::Resolution,
        ImageField::AspectRatio,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ImageField::MainSubject => "mainSubject",
            ImageField::Environment => "environment",
            ImageField::TimeOfDay => "timeOfDay",
            ImageField::ArtStyle => "artStyle",
            ImageField::Mood => "mood",
            ImageField::Lighting => "lighting",
            ImageField::ColorPalette => "colorPalette",
            ImageField::CameraAngle => "cameraAngle",
            ImageField::ShotType => "shotType",
            ImageField::DepthOfField => "depthOfField",
            ImageField::Resolution => "resolution",
            ImageField::AspectRatio => "aspectRatio",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ImageField::MainSubject => "The core focus of your image. Be descriptive.",
            ImageField::Environment => "The physical setting or background location.",
            ImageField::TimeOfDay => "Lighting conditions based on sun position or time.",
            ImageField::ArtStyle => "The overall artistic medium or genre.",
            ImageField::Mood => "Emotional atmosphere or feeling of the image.",
            ImageField::Lighting => "Type and direction of light sources.",
            ImageField::ColorPalette => "Dominant color schemes and tonal balance.",
            ImageField::CameraAngle => "Perspective relative to the subject.",
            ImageField::ShotType => "Framing distance and subject prominence.",
            ImageField::DepthOfField => "Focus range and background blur intensity.",
            ImageField::Resolution => "Image clarity, pixel density, or render quality.",
            ImageField::AspectRatio => "Width-to-height proportion of the frame.",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|f| f.key() == key)
    }
}

/// Keys of a text attribute set, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Purpose,
    WritingStyle,
    Tone,
    Length,
    Audience,
    Context,
    AdditionalInstructions,
}

impl TextField {
    pub const ALL: [TextField; 7] = [
        TextField::Purpose,
        TextField::WritingStyle,
        TextField::Tone,
        TextField::Length,
        TextField::Audience,
        TextField::Context,
        TextField::AdditionalInstructions,
    ];

    pub fn key(self) -> &'static str {
        match self {
            TextField::Purpose => "purpose",
            TextField::WritingStyle => "writingStyle",
            TextField::Tone => "tone",
            TextField::Length => "length",
            TextField::Audience => "audience",
            TextField::Context => "context",
            TextField::AdditionalInstructions => "additionalInstructions",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            TextField::Purpose => "What the model should produce.",
            TextField::WritingStyle => "Register or genre of the writing.",
            TextField::Tone => "Emotional color of the response.",
            TextField::Length => "How long the output should be.",
            TextField::Audience => "Who the output is written for.",
            TextField::Context => "Main topic or background the model needs.",
            TextField::AdditionalInstructions => "Free-form constraints appended verbatim.",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Image generation selections. Empty string means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageAttributes {
    pub main_subject: String,
    pub art_style: String,
    pub color_palette: String,
    pub lighting: String,
    pub camera_angle: String,
    pub shot_type: String,
    pub depth_of_field: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub mood: String,
    pub environment: String,
    pub time_of_day: String,
}

impl ImageAttributes {
    pub fn get(&self, field: ImageField) -> &str {
        match field {
            ImageField::MainSubject => &self.main_subject,
            ImageField::Environment => &self.environment,
            ImageField::TimeOfDay => &self.time_of_day,
            ImageField::ArtStyle => &self.art_style,
            ImageField::Mood => &self.mood,
            ImageField::Lighting => &self.lighting,
            ImageField::ColorPalette => &self.color_palette,
            ImageField::CameraAngle => &self.camera_angle,
            ImageField::ShotType => &self.shot_type,
            ImageField::DepthOfField => &self.depth_of_field,
            ImageField::Resolution => &self.resolution,
            ImageField::AspectRatio => &self.aspect_ratio,
        }
    }

    pub fn set(&mut self, field: ImageField, value: impl Into<String>) {
        let slot = match field {
            ImageField::MainSubject => &mut self.main_subject,
            ImageField::Environment => &mut self.environment,
            ImageField::TimeOfDay => &mut self.time_of_day,
            ImageField::ArtStyle => &mut self.art_style,
            ImageField::Mood => &mut self.mood,
            ImageField::Lighting => &mut self.lighting,
            ImageField::ColorPalette => &mut self.color_palette,
            ImageField::CameraAngle => &mut self.camera_angle,
            ImageField::ShotType => &mut self.shot_type,
            ImageField::DepthOfField => &mut self.depth_of_field,
            ImageField::Resolution => &mut self.resolution,
            ImageField::AspectRatio => &mut self.aspect_ratio,
        };
        *slot = value.into();
    }
}

/// Text generation selections. Empty string means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TextAttributes {
    pub purpose: String,
    pub writing_style: String,
    pub tone: String,
    pub length: String,
    pub audience: String,
    pub context: String,
    pub additional_instructions: String,
}

impl TextAttributes {
    pub fn get(&self, field: TextField) -> &str {
        match field {
            TextField::Purpose => &self.purpose,
            TextField::WritingStyle => &self.writing_style,
            TextField::Tone => &self.tone,
            TextField::Length => &self.length,
            TextField::Audience => &self.audience,
            TextField::Context => &self.context,
            TextField::AdditionalInstructions => &self.additional_instructions,
        }
    }

    pub fn set(&mut self, field: TextField, value: impl Into<String>) {
        let slot = match field {
            TextField::Purpose => &mut self.purpose,
            TextField::WritingStyle => &mut self.writing_style,
            TextField::Tone => &mut self.tone,
            TextField::Length => &mut self.length,
            TextField::Audience => &mut self.audience,
            TextField::Context => &mut self.context,
            TextField::AdditionalInstructions => &mut self.additional_instructions,
        };
        *slot = value.into();
    }
}

/// The user's current selections for one prompt kind.
///
/// Serialized untagged: the two field sets are disjoint and both records
/// reject unknown fields, so the JSON object alone identifies the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeSet {
    Image(ImageAttributes),
    Text(TextAttributes),
}

impl AttributeSet {
    /// All-empty default for `kind`. Also what a reset replaces the record with.
    pub fn empty(kind: PromptKind) -> Self {
        match kind {
            PromptKind::Image => AttributeSet::Image(ImageAttributes::default()),
            PromptKind::Text => AttributeSet::Text(TextAttributes::default()),
        }
    }

    pub fn kind(&self) -> PromptKind {
        match self {
            AttributeSet::Image(_) => PromptKind::Image,
            AttributeSet::Text(_) => PromptKind::Text,
        }
    }

    /// Field keys for `kind`, image keys in assembly priority order.
    pub fn keys(kind: PromptKind) -> Vec<&'static str> {
        match kind {
            PromptKind::Image => ImageField::PRIORITY.iter().map(|f| f.key()).collect(),
            PromptKind::Text => TextField::ALL.iter().map(|f| f.key()).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Result<&str> {
        match self {
            AttributeSet::Image(a) => ImageField::from_key(key)
                .map(|f| a.get(f))
                .ok_or_else(|| self.unknown(key)),
            AttributeSet::Text(a) => TextField::from_key(key)
                .map(|f| a.get(f))
                .ok_or_else(|| self.unknown(key)),
        }
    }

    /// Replace a single field, leaving every other field untouched.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        match self {
            AttributeSet::Image(a) => match ImageField::from_key(key) {
                Some(f) => {
                    a.set(f, value);
                    Ok(())
                }
                None => Err(CoreError::UnknownField {
                    kind: PromptKind::Image,
                    field: key.to_string(),
                }),
            },
            AttributeSet::Text(a) => match TextField::from_key(key) {
                Some(f) => {
                    a.set(f, value);
                    Ok(())
                }
                None => Err(CoreError::UnknownField {
                    kind: PromptKind::Text,
                    field: key.to_string(),
                }),
            },
        }
    }

    /// Build a set from a partial key/value map on top of the empty default.
    pub fn from_fields<I, K, V>(kind: PromptKind, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut set = Self::empty(kind);
        for (key, value) in fields {
            set.set(key.as_ref(), value)?;
        }
        Ok(set)
    }

    /// Strictly decode a stored snapshot against the field set of `kind`.
    pub fn from_value(kind: PromptKind, value: serde_json::Value) -> Result<Self> {
        let decoded = match kind {
            PromptKind::Image => serde_json::from_value(value).map(AttributeSet::Image),
            PromptKind::Text => serde_json::from_value(value).map(AttributeSet::Text),
        };
        decoded.map_err(|e| CoreError::ShapeMismatch {
            kind,
            message: e.to_string(),
        })
    }

    /// `(key, value)` pairs for every field, including empty ones.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        match self {
            AttributeSet::Image(a) => ImageField::PRIORITY
                .iter()
                .map(|f| (f.key(), a.get(*f)))
                .collect(),
            AttributeSet::Text(a) => TextField::ALL
                .iter()
                .map(|f| (f.key(), a.get(*f)))
                .collect(),
        }
    }

    fn unknown(&self, key: &str) -> CoreError {
        CoreError::UnknownField {
            kind: self.kind(),
            field: key.to_string(),
        }
    }
}

// --- Storage location ---

/// Resolve the global data directory (~/.prompt-architect/).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prompt-architect")
}

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            api_key: String::new(),
            model: "gemini-3-pro-preview".to_string(),
        }
    }
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Read settings from disk, falling back to defaults. An empty key is
/// filled from the `API_KEY` environment variable.
pub fn read_settings() -> AiSettings {
    let path = settings_path();
    let mut settings: AiSettings = if path.exists() {
        fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    } else {
        AiSettings::default()
    };
    if settings.api_key.is_empty() {
        if let Ok(key) = std::env::var("API_KEY") {
            settings.api_key = key;
        }
    }
    settings
}

pub fn ai_configured(settings: &AiSettings) -> bool {
    !settings.provider.is_empty()
        && !settings.model.is_empty()
        && (settings.provider == "ollama" || !settings.api_key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_one_field_only() {
        let mut set = AttributeSet::from_fields(
            PromptKind::Image,
            [("mainSubject", "a fox"), ("mood", "serene")],
        )
        .unwrap();
        set.set("mood", "ominous").unwrap();

        assert_eq!(set.get("mainSubject").unwrap(), "a fox");
        assert_eq!(set.get("mood").unwrap(), "ominous");
        assert_eq!(set.get("lighting").unwrap(), "");
    }

    #[test]
    fn unknown_key_is_rejected_per_kind() {
        let mut text = AttributeSet::empty(PromptKind::Text);
        let err = text.set("mainSubject", "x").unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownField { kind: PromptKind::Text, .. }
        ));
        assert_eq!(text, AttributeSet::empty(PromptKind::Text));
    }

    #[test]
    fn serialization_keeps_empty_fields() {
        let json = serde_json::to_value(AttributeSet::empty(PromptKind::Text)).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), TextField::ALL.len());
        assert_eq!(obj["additionalInstructions"], "");
    }

    #[test]
    fn untagged_decode_picks_the_matching_variant() {
        let text = AttributeSet::from_fields(PromptKind::Text, [("purpose", "summarize")]).unwrap();
        let raw = serde_json::to_string(&text).unwrap();
        let back: AttributeSet = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.kind(), PromptKind::Text);
        assert_eq!(back, text);
    }

    #[test]
    fn from_value_rejects_other_kind_shape() {
        let image = serde_json::to_value(AttributeSet::empty(PromptKind::Image)).unwrap();
        let err = AttributeSet::from_value(PromptKind::Text, image).unwrap_err();
        assert!(matches!(err, CoreError::ShapeMismatch { .. }));
    }

    #[test]
    fn from_value_rejects_missing_fields() {
        let partial = serde_json::json!({ "purpose": "x" });
        assert!(AttributeSet::from_value(PromptKind::Text, partial).is_err());
    }

    #[test]
    fn prompt_kind_accepts_both_spellings() {
        let upper: PromptKind = serde_json::from_str("\"IMAGE\"").unwrap();
        let lower: PromptKind = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(upper, PromptKind::Image);
        assert_eq!(lower, PromptKind::Text);
        assert_eq!(serde_json::to_string(&PromptKind::Text).unwrap(), "\"TEXT\"");
        assert_eq!(PromptKind::parse(" Image "), Some(PromptKind::Image));
    }

    #[test]
    fn ollama_needs_no_key() {
        let settings = AiSettings {
            provider: "ollama".to_string(),
            api_key: String::new(),
            model: "llama3".to_string(),
        };
        assert!(ai_configured(&settings));
        assert!(!ai_configured(&AiSettings {
            api_key: String::new(),
            ..AiSettings::default()
        }));
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let settings: AiSettings = serde_json::from_str(r#"{"apiKey":"k"}"#).unwrap();
        assert_eq!(settings.provider, "google");
        assert_eq!(settings.model, "gemini-3-pro-preview");
        assert_eq!(settings.api_key, "k");
    }

    #[test]
    fn prompt_kind_schema_advertises_the_written_spelling() {
        let schema = serde_json::to_value(schemars::schema_for!(PromptKind)).unwrap();
        assert_eq!(schema["enum"], serde_json::json!(["IMAGE", "TEXT"]));
    }
}
