//! Voice and language catalog.
//!
//! The catalog is loaded once from a Piper-style `voices.json` (an object keyed
//! by voice id) and never mutated afterwards. Voice order and per-voice file
//! order follow the document, so every "first" below is deterministic.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::language::family_of;

/// Extension marking a voice's model asset.
pub const MODEL_EXTENSION: &str = ".onnx";

/// Suffix appended to the model path to get its config asset.
pub const CONFIG_SUFFIX: &str = ".json";

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("No model files found for voice {0}")]
    NoModelFiles(String),
    #[error("Failed to parse voice catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Locale identifier, `primary_REGION` (e.g. `en_US`)
    pub code: String,
    /// Primary subtag (e.g. `en`)
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub name_english: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_native: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_english: Option<String>,
}

impl Language {
    /// The family subtag, derived from `code` when the catalog omits it.
    pub fn family_subtag(&self) -> &str {
        if self.family.is_empty() {
            family_of(&self.code)
        } else {
            &self.family
        }
    }

    pub fn is_english(&self) -> bool {
        self.family_subtag() == "en"
    }
}

/// Quality tier, ordered `x_low < low < medium < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    XLow,
    Low,
    Medium,
    High,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::XLow => "x_low",
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceFile {
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    /// Catalog key, e.g. `en_US-lessac-medium`
    #[serde(default, alias = "key")]
    pub id: String,
    pub name: String,
    pub language: Language,
    pub quality: Quality,
    /// Asset files in catalog order: relative path → metadata
    #[serde(default, with = "ordered_map")]
    pub files: Vec<(String, VoiceFile)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_speakers: Option<u32>,
}

impl Voice {
    /// Size of the model asset, if the catalog lists one.
    pub fn model_size_bytes(&self) -> Option<u64> {
        self.files
            .iter()
            .find(|(name, _)| name.ends_with(MODEL_EXTENSION))
            .map(|(_, file)| file.size_bytes)
            .filter(|&size| size > 0)
    }
}

/// Store-relative paths of a voice's two assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub model_path: String,
    pub config_path: String,
}

/// Derive the model and config paths from the first model-kind file.
pub fn get_model_paths(voice: &Voice) -> Result<ModelPaths, CatalogError> {
    let (model_path, _) = voice
        .files
        .iter()
        .find(|(name, _)| name.ends_with(MODEL_EXTENSION))
        .ok_or_else(|| CatalogError::NoModelFiles(voice.id.clone()))?;

    Ok(ModelPaths {
        model_path: model_path.clone(),
        config_path: format!("{model_path}{CONFIG_SUFFIX}"),
    })
}

/// Distinct languages referenced by `voices`, sorted by English name.
pub fn extract_languages(voices: &[Voice]) -> Vec<Language> {
    let mut languages: Vec<Language> = Vec::new();
    for voice in voices {
        if !languages.iter().any(|l| l.code == voice.language.code) {
            languages.push(voice.language.clone());
        }
    }
    languages.sort_by(|a, b| a.name_english.cmp(&b.name_english));
    languages
}

/// Voices for one language code, sorted by quality tier then name.
pub fn get_voices_for_language<'a>(voices: &'a [Voice], code: &str) -> Vec<&'a Voice> {
    let mut matching: Vec<&Voice> = voices.iter().filter(|v| v.language.code == code).collect();
    matching.sort_by(|a, b| a.quality.cmp(&b.quality).then_with(|| a.name.cmp(&b.name)));
    matching
}

/// The English language if present, else the first one.
pub fn get_default_language(languages: &[Language]) -> Option<&Language> {
    languages
        .iter()
        .find(|l| l.is_english())
        .or_else(|| languages.first())
}

/// First medium voice, else first high voice, else the first voice.
pub fn get_default_voice<'a>(voices: &[&'a Voice]) -> Option<&'a Voice> {
    let first_of = |quality: Quality| voices.iter().copied().find(|v| v.quality == quality);
    first_of(Quality::Medium)
        .or_else(|| first_of(Quality::High))
        .or_else(|| voices.first().copied())
}

/// Immutable index over the loaded voices.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
    languages: Vec<Language>,
}

impl VoiceCatalog {
    pub fn from_voices(voices: Vec<Voice>) -> Self {
        for voice in &voices {
            if get_model_paths(voice).is_err() {
                log::warn!("Voice {} lists no model asset", voice.id);
            }
        }
        let languages = extract_languages(&voices);
        log::info!(
            "Loaded voice catalog: {} voices, {} languages",
            voices.len(),
            languages.len()
        );
        Self { voices, languages }
    }

    /// Parse a `voices.json` document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let entries: ordered_map::Entries<Voice> = serde_json::from_str(json)?;
        let voices = entries
            .0
            .into_iter()
            .map(|(key, mut voice)| {
                if voice.id.is_empty() {
                    voice.id = key;
                }
                voice
            })
            .collect();
        Ok(Self::from_voices(voices))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Languages sorted by English name.
    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn get(&self, id: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == id)
    }

    pub fn language(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }

    pub fn voices_for_language(&self, code: &str) -> Vec<&Voice> {
        get_voices_for_language(&self.voices, code)
    }

    pub fn default_language(&self) -> Option<&Language> {
        get_default_language(&self.languages)
    }

    pub fn default_voice_for_language(&self, code: &str) -> Option<&Voice> {
        get_default_voice(&self.voices_for_language(code))
    }
}

/// Serde adapter keeping JSON object entries in document order.
mod ordered_map {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
    use serde::ser::{SerializeMap, Serializer};
    use serde::Serialize;

    pub struct Entries<V>(pub Vec<(String, V)>);

    impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserialize(deserializer).map(Entries)
        }
    }

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, V>(entries: &Vec<(String, V)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}
