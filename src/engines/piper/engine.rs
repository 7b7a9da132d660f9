use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::PiperConfig;
use super::model::PiperModel;
use super::phonemizer::{phonemize, EspeakConfig};
use crate::cache::ModelAssets;
use crate::{InferenceEngine, Waveform};

/// Parameters for configuring Piper model loading and synthesis.
#[derive(Debug, Clone, Default)]
pub struct PiperModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Speaker for multi-speaker voices; defaults to the first one.
    pub speaker_id: Option<i64>,
}

struct LoadedVoice {
    voice_id: String,
    model: Arc<Mutex<PiperModel>>,
}

/// Piper text-to-speech engine.
///
/// Loads the voice from the cached model and config bytes on first use and
/// keeps the most recent voice loaded. Requires espeak-ng for phonemization.
///
/// # Quick Start
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use piper_local::engines::piper::PiperEngine;
///
/// // Uses system espeak-ng from PATH
/// let engine = Arc::new(PiperEngine::new());
/// ```
///
/// # Bundled espeak-ng
///
/// ```rust,no_run
/// use piper_local::engines::piper::PiperEngine;
/// use std::path::PathBuf;
///
/// let engine = PiperEngine::with_espeak(
///     Some(PathBuf::from("/app/resources/espeak-ng/espeak-ng")),
///     Some(PathBuf::from("/app/resources/espeak-ng-data")),
/// );
/// ```
pub struct PiperEngine {
    espeak: EspeakConfig,
    params: PiperModelParams,
    loaded: Mutex<Option<LoadedVoice>>,
}

impl Default for PiperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PiperEngine {
    /// Create a new engine that uses `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self {
            espeak: EspeakConfig::default(),
            params: PiperModelParams::default(),
            loaded: Mutex::new(None),
        }
    }

    /// Create a new engine with explicit espeak-ng binary and data paths.
    ///
    /// Either path can be `None` to fall back to the system default.
    pub fn with_espeak(bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        Self {
            espeak: EspeakConfig {
                bin_path,
                data_path,
            },
            ..Self::new()
        }
    }

    pub fn with_params(mut self, params: PiperModelParams) -> Self {
        self.params = params;
        self
    }

    /// Id of the voice currently held in memory.
    pub fn loaded_voice(&self) -> Option<String> {
        self.loaded.lock().as_ref().map(|v| v.voice_id.clone())
    }

    /// Drop the loaded voice.
    pub fn unload_model(&self) {
        self.loaded.lock().take();
    }

    async fn model_for(
        &self,
        assets: &ModelAssets,
    ) -> Result<Arc<Mutex<PiperModel>>, Box<dyn std::error::Error + Send + Sync>> {
        let current = self
            .loaded
            .lock()
            .as_ref()
            .filter(|loaded| loaded.voice_id == assets.voice_id)
            .map(|loaded| loaded.model.clone());
        if let Some(model) = current {
            return Ok(model);
        }

        let model_bytes = assets.model.clone();
        let config_bytes = assets.config.clone();
        let num_threads = self.params.num_threads;
        let model = tokio::task::spawn_blocking(move || {
            PiperModel::load_from_bytes(&model_bytes, &config_bytes, num_threads)
        })
        .await??;

        let model = Arc::new(Mutex::new(model));
        *self.loaded.lock() = Some(LoadedVoice {
            voice_id: assets.voice_id.clone(),
            model: model.clone(),
        });
        log::info!("Loaded Piper voice {}", assets.voice_id);
        Ok(model)
    }
}

#[async_trait]
impl InferenceEngine for PiperEngine {
    async fn synthesize(
        &self,
        text: &str,
        assets: &ModelAssets,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<Waveform, Box<dyn std::error::Error + Send + Sync>> {
        let model = self.model_for(assets).await?;
        let config: Arc<PiperConfig> = model.lock().config().clone();

        let espeak = self.espeak.clone();
        let input = text.to_string();
        let phoneme_config = config.clone();
        let ids = tokio::task::spawn_blocking(move || phonemize(&input, &phoneme_config, &espeak))
            .await??;
        on_progress(0.2);

        let speaker = self.params.speaker_id;
        let samples = tokio::task::spawn_blocking(move || {
            let mut model = model.lock();
            model.infer(&ids, speaker)
        })
        .await??;
        on_progress(1.0);

        Ok(Waveform::mono(samples, config.audio.sample_rate))
    }
}
