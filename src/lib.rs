//! # piper-local
//!
//! Client-side text-to-speech core. Turns arbitrary text into speech using a
//! downloadable, cacheable voice model and a local inference engine.
//!
//! ## Features
//!
//! - **Text segmentation**: paragraph and sentence aware chunking with a
//!   character budget, CJK aware
//! - **Language matching**: script-based language detection matched against
//!   the voice catalog
//! - **Model cache**: voice assets persisted in a pluggable byte store, with
//!   deduplicated downloads and progress milestones
//! - **Chunked synthesis**: ordered per-chunk inference with aggregate
//!   progress and cooperative cancellation
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-local = { version = "2026.2", features = ["piper"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use piper_local::{
//!     catalog::VoiceCatalog, config::TtsConfig, context::TtsContext,
//!     engines::piper::PiperEngine, fetch::HttpAssetFetcher,
//! };
//!
//! let config = TtsConfig::default();
//! let catalog = VoiceCatalog::from_json_file("voices.json")?;
//! let fetcher = Arc::new(HttpAssetFetcher::new(&config.voices_base_url));
//! let context = TtsContext::initialize(config, catalog, fetcher).await?;
//!
//! let voice = context.catalog().get("en_US-lessac-medium").unwrap().clone();
//! let orchestrator = context.orchestrator(Arc::new(PiperEngine::new()));
//! let audio = orchestrator.generate_audio("Hello, world!", &voice, 1.0, None).await?;
//! audio.write_wav(std::path::Path::new("output.wav"))?;
//! context.shutdown().await?;
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod engines;
pub mod fetch;
pub mod language;
pub mod session;
pub mod synthesis;
pub mod text;

use std::path::Path;

use async_trait::async_trait;

use crate::cache::ModelAssets;

/// One chunk's worth of synthesized audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Interleaved f32 samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Waveform {
    /// Create a mono waveform.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channel_count: 1,
        }
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.samples.len(), self.sample_rate, self.channel_count)
    }

    fn same_layout(&self, other: &Waveform) -> bool {
        self.sample_rate == other.sample_rate && self.channel_count == other.channel_count
    }
}

/// The result of a full synthesis run.
///
/// Holds the ordered concatenation of every chunk's waveform. `playback_rate`
/// is carried for the consumer; the samples are never re-timed.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioResult {
    /// Raw audio samples as f32 values, interleaved when multi-channel
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Playback speed multiplier requested by the caller
    pub playback_rate: f32,
}

impl AudioResult {
    /// Concatenate chunk waveforms in order.
    ///
    /// Fails with the index of the first waveform whose sample rate or channel
    /// layout differs from the first one.
    pub fn concatenate(waveforms: Vec<Waveform>, playback_rate: f32) -> Result<Self, usize> {
        let Some(first) = waveforms.first() else {
            return Ok(Self {
                samples: Vec::new(),
                sample_rate: 0,
                channel_count: 1,
                playback_rate,
            });
        };

        if let Some(index) = waveforms.iter().position(|w| !w.same_layout(first)) {
            return Err(index);
        }

        let sample_rate = first.sample_rate;
        let channel_count = first.channel_count;
        let total: usize = waveforms.iter().map(|w| w.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for waveform in waveforms {
            samples.extend_from_slice(&waveform.samples);
        }

        Ok(Self {
            samples,
            sample_rate,
            channel_count,
            playback_rate,
        })
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let spec = hound::WavSpec {
            channels: self.channel_count,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds, at normal speed.
    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.samples.len(), self.sample_rate, self.channel_count)
    }

    /// Wall-clock duration once the consumer applies `playback_rate`.
    pub fn playback_duration_secs(&self) -> f64 {
        if self.playback_rate <= 0.0 {
            return self.duration_secs();
        }
        self.duration_secs() / self.playback_rate as f64
    }
}

fn frames_to_secs(samples: usize, sample_rate: u32, channel_count: u16) -> f64 {
    if sample_rate == 0 || channel_count == 0 {
        return 0.0;
    }
    samples as f64 / channel_count as f64 / sample_rate as f64
}

/// Boundary to the local neural inference engine.
///
/// Implementations receive one chunk of text plus the cached model and config
/// bytes and return that chunk's waveform. `on_progress` accepts a fraction in
/// `0.0..=1.0` for engines that can report sub-chunk progress; it may be
/// ignored.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        assets: &ModelAssets,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<Waveform, Box<dyn std::error::Error + Send + Sync>>;
}
