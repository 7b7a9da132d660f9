use std::fmt;

/// Where a synthesis run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    EnsuringModel,
    Segmenting,
    /// Zero-based chunk index
    SynthesizingChunk(usize),
    Concatenating,
    Done,
    Failed(String),
}

impl RunState {
    fn rank(&self) -> (u8, usize) {
        match self {
            RunState::Idle => (0, 0),
            RunState::EnsuringModel => (1, 0),
            RunState::Segmenting => (2, 0),
            RunState::SynthesizingChunk(i) => (3, *i),
            RunState::Concatenating => (4, 0),
            RunState::Done => (5, 0),
            RunState::Failed(_) => (6, 0),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }

    /// Whether a run may move from `self` to `next`.
    ///
    /// States only move forward; `Failed` is reachable from `EnsuringModel`
    /// and any `SynthesizingChunk`.
    pub fn can_advance_to(&self, next: &RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunState::Failed(_) => {
                matches!(self, RunState::EnsuringModel | RunState::SynthesizingChunk(_))
            }
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::EnsuringModel => f.write_str("ensuring model"),
            RunState::Segmenting => f.write_str("segmenting"),
            RunState::SynthesizingChunk(i) => write!(f, "synthesizing chunk {i}"),
            RunState::Concatenating => f.write_str("concatenating"),
            RunState::Done => f.write_str("done"),
            RunState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
