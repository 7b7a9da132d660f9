use std::collections::HashMap;

use serde::Deserialize;

use super::model::PiperError;

/// Beginning of utterance.
pub const BOS: char = '^';
/// Inserted after every phoneme.
pub const PAD: char = '_';
/// End of utterance.
pub const EOS: char = '$';

/// The parts of a Piper `.onnx.json` voice config used for inference.
#[derive(Debug, Clone, Deserialize)]
pub struct PiperConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub espeak: EspeakVoice,
    #[serde(default)]
    pub inference: InferenceConfig,
    phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default = "default_num_speakers")]
    pub num_speakers: u32,
    #[serde(skip)]
    phoneme_ids: HashMap<char, Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakVoice {
    pub voice: String,
}

impl Default for EspeakVoice {
    fn default() -> Self {
        Self {
            voice: "en-us".to_string(),
        }
    }
}

/// Scales fed to the model's `scales` input.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_w: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: 0.667,
            length_scale: 1.0,
            noise_w: 0.8,
        }
    }
}

fn default_num_speakers() -> u32 {
    1
}

impl PiperConfig {
    /// Parse a config as stored in the model cache.
    ///
    /// The phoneme map must define the `^`, `_` and `$` control symbols.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PiperError> {
        let mut config: PiperConfig = serde_json::from_slice(bytes)
            .map_err(|e| PiperError::Config(format!("Failed to parse JSON: {e}")))?;

        let mut ids = HashMap::with_capacity(config.phoneme_id_map.len());
        for (key, value) in &config.phoneme_id_map {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                log::warn!("Skipping multi-character phoneme {key:?}");
                continue;
            };
            ids.insert(ch, value.clone());
        }

        for symbol in [BOS, PAD, EOS] {
            if !ids.contains_key(&symbol) {
                return Err(PiperError::Config(format!(
                    "phoneme_id_map is missing {symbol:?}"
                )));
            }
        }
        if config.audio.sample_rate == 0 {
            return Err(PiperError::Config("audio.sample_rate must be positive".to_string()));
        }

        config.phoneme_ids = ids;
        Ok(config)
    }

    pub fn is_multi_speaker(&self) -> bool {
        self.num_speakers > 1
    }

    pub fn ids_for(&self, phoneme: char) -> Option<&[i64]> {
        self.phoneme_ids.get(&phoneme).map(Vec::as_slice)
    }

    /// Map phonemes to model input ids: `^`, then every known phoneme
    /// followed by `_`, then `$`. Unknown phonemes are dropped.
    pub fn phonemes_to_ids(&self, phonemes: impl IntoIterator<Item = char>) -> Vec<i64> {
        let control = |symbol: char| self.ids_for(symbol).unwrap_or(&[]);
        let pad = control(PAD);

        let mut ids = Vec::new();
        ids.extend_from_slice(control(BOS));
        ids.extend_from_slice(pad);
        for phoneme in phonemes {
            match self.ids_for(phoneme) {
                Some(phoneme_ids) => {
                    ids.extend_from_slice(phoneme_ids);
                    ids.extend_from_slice(pad);
                }
                None => log::debug!("No id for phoneme {phoneme:?}"),
            }
        }
        ids.extend_from_slice(control(EOS));
        ids
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CONFIG_JSON: &str = r#"{
        "audio": {"sample_rate": 22050, "quality": "low"},
        "espeak": {"voice": "en-us"},
        "inference": {"noise_scale": 0.5, "length_scale": 1.1, "noise_w": 0.7},
        "phoneme_type": "espeak",
        "phoneme_map": {},
        "phoneme_id_map": {
            "_": [0], "^": [1], "$": [2], " ": [3], ".": [10],
            "h": [20], "ə": [59], "l": [24], "o": [27], "ʊ": [100], "ˈ": [120]
        },
        "num_symbols": 256,
        "num_speakers": 1,
        "speaker_id_map": {}
    }"#;

    #[test]
    fn parses_piper_config() {
        let config = PiperConfig::from_bytes(CONFIG_JSON.as_bytes()).unwrap();
        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.espeak.voice, "en-us");
        assert_eq!(config.inference.length_scale, 1.1);
        assert!(!config.is_multi_speaker());
        assert_eq!(config.ids_for('ə'), Some(&[59][..]));
    }

    #[test]
    fn interleaves_padding_between_phonemes() {
        let config = PiperConfig::from_bytes(CONFIG_JSON.as_bytes()).unwrap();
        let ids = config.phonemes_to_ids("həˈloʊ.".chars());
        assert_eq!(
            ids,
            vec![1, 0, 20, 0, 59, 0, 120, 0, 24, 0, 27, 0, 100, 0, 10, 0, 2]
        );
    }

    #[test]
    fn drops_unknown_phonemes() {
        let config = PiperConfig::from_bytes(CONFIG_JSON.as_bytes()).unwrap();
        assert_eq!(config.phonemes_to_ids("hx".chars()), vec![1, 0, 20, 0, 2]);
    }

    #[test]
    fn missing_defaults_fall_back() {
        let config = PiperConfig::from_bytes(
            br#"{"audio": {"sample_rate": 16000}, "phoneme_id_map": {"_": [0], "^": [1], "$": [2]}}"#,
        )
        .unwrap();
        assert_eq!(config.inference, InferenceConfig::default());
        assert_eq!(config.espeak.voice, "en-us");
        assert_eq!(config.num_speakers, 1);
    }

    #[test]
    fn rejects_map_without_control_symbols() {
        let err = PiperConfig::from_bytes(
            br#"{"audio": {"sample_rate": 16000}, "phoneme_id_map": {"a": [5]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PiperError::Config(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            PiperConfig::from_bytes(b"not json"),
            Err(PiperError::Config(_))
        ));
    }
}
