//! Chunked synthesis runs.
//!
//! # Run lifecycle
//!
//! ```text
//! Idle → EnsuringModel → Segmenting → SynthesizingChunk(0..N) → Concatenating → Done
//!             ↘                              ↘
//!              Failed                         Failed
//! ```
//!
//! Starting a new run bumps the orchestrator's run token. A run whose token is
//! stale stops at its next suspension point with [`SynthesisError::Superseded`]
//! and emits nothing further.

pub mod orchestrator;
pub mod progress;
pub mod state;

pub use orchestrator::{SynthesisError, SynthesisOrchestrator};
pub use progress::{ProgressTracker, SynthesisProgress};
pub use state::RunState;
