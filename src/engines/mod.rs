//! Speech synthesis engines.
//!
//! Implementations of [`InferenceEngine`](crate::InferenceEngine).
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `piper` - Piper voices (ONNX format, espeak-ng required)

#[cfg(feature = "piper")]
pub mod piper;
