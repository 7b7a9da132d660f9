//! Piper text-to-speech engine.
//!
//! Runs Piper VITS voices through ONNX Runtime. A voice is the pair of assets
//! held by the model cache: the `.onnx` graph and its `.onnx.json` config,
//! which supplies the phoneme id map, sample rate, espeak-ng voice and
//! inference scales.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed on your system:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Model Inputs
//!
//! | Name | Type | Shape |
//! |---|---|---|
//! | `input` | int64 | `[1, N]` phoneme ids |
//! | `input_lengths` | int64 | `[1]` |
//! | `scales` | float32 | `[3]` noise, length, noise width |
//! | `sid` | int64 | `[1]`, multi-speaker voices only |

pub mod config;
pub mod engine;
pub mod model;
pub mod phonemizer;

pub use config::PiperConfig;
pub use engine::{PiperEngine, PiperModelParams};
pub use model::PiperError;
pub use phonemizer::EspeakConfig;
