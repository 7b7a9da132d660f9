use std::sync::Arc;

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::config::PiperConfig;

#[derive(thiserror::Error, Debug)]
pub enum PiperError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid voice config: {0}")]
    Config(String),
    #[error("Speaker {speaker} out of range for a {num_speakers}-speaker voice")]
    Speaker { speaker: i64, num_speakers: u32 },
}

/// One Piper voice loaded into ONNX Runtime.
pub struct PiperModel {
    session: Session,
    config: Arc<PiperConfig>,
}

impl PiperModel {
    /// Build a session from cached model and config bytes.
    pub fn load_from_bytes(
        model: &[u8],
        config: &[u8],
        num_threads: Option<usize>,
    ) -> Result<Self, PiperError> {
        let config = Arc::new(PiperConfig::from_bytes(config)?);
        log::info!(
            "Loading Piper model ({:.1} MB, {} Hz, espeak voice '{}')",
            model.len() as f64 / 1_048_576.0,
            config.audio.sample_rate,
            config.espeak.voice
        );

        let providers = vec![CPUExecutionProvider::default().build()];
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(providers)?;
        if let Some(threads) = num_threads {
            builder = builder
                .with_intra_threads(threads)?
                .with_inter_threads(threads)?;
        }
        let session = builder.commit_from_memory(model)?;

        Ok(Self { session, config })
    }

    pub fn config(&self) -> &Arc<PiperConfig> {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.audio.sample_rate
    }

    /// Run the model on phoneme ids, returning mono samples.
    pub fn infer(&mut self, ids: &[i64], speaker: Option<i64>) -> Result<Vec<f32>, PiperError> {
        // BOS, PAD and EOS alone carry no speech.
        if ids.len() <= 3 {
            log::warn!("No phonemes to synthesize");
            return Ok(Vec::new());
        }

        let input = Array2::from_shape_vec((1, ids.len()), ids.to_vec())?;
        let input_lengths = ndarray::arr1(&[ids.len() as i64]);
        let scales = ndarray::arr1(&[
            self.config.inference.noise_scale,
            self.config.inference.length_scale,
            self.config.inference.noise_w,
        ]);

        let output = if self.config.is_multi_speaker() {
            let speaker = speaker.unwrap_or(0);
            if speaker < 0 || speaker >= self.config.num_speakers as i64 {
                return Err(PiperError::Speaker {
                    speaker,
                    num_speakers: self.config.num_speakers,
                });
            }
            let sid = ndarray::arr1(&[speaker]);
            let inputs = inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
                "sid" => TensorRef::from_array_view(sid.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let inputs = inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
            ];
            self.session.run(inputs)?
        };

        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| PiperError::Ort(ort::Error::new("No output from model")))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}
