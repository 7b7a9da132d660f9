use parking_lot::Mutex;

/// Aggregate progress of one synthesis run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisProgress {
    /// One-based index of the chunk in flight or just finished
    pub current_chunk_index: usize,
    pub total_chunks: usize,
    /// 0.0..=100.0
    pub percent: f32,
}

/// Turns per-chunk events into monotonically non-decreasing progress.
///
/// Events that would move the chunk index or percentage backwards are dropped.
pub struct ProgressTracker<'a> {
    total_chunks: usize,
    sink: Option<&'a (dyn Fn(SynthesisProgress) + Send + Sync)>,
    last: Mutex<Option<SynthesisProgress>>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        total_chunks: usize,
        sink: Option<&'a (dyn Fn(SynthesisProgress) + Send + Sync)>,
    ) -> Self {
        Self {
            total_chunks,
            sink,
            last: Mutex::new(None),
        }
    }

    /// Chunk `index` (zero-based) reported `fraction` of its own work.
    pub fn chunk_progress(&self, index: usize, fraction: f32) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.emit(index, index as f32 + fraction);
    }

    /// Chunk `index` (zero-based) finished.
    pub fn chunk_done(&self, index: usize) {
        self.emit(index, (index + 1) as f32);
    }

    fn emit(&self, index: usize, completed_chunks: f32) {
        if self.total_chunks == 0 {
            return;
        }
        let progress = SynthesisProgress {
            current_chunk_index: (index + 1).min(self.total_chunks),
            total_chunks: self.total_chunks,
            percent: (completed_chunks / self.total_chunks as f32 * 100.0).clamp(0.0, 100.0),
        };

        {
            let mut last = self.last.lock();
            if let Some(previous) = *last {
                if progress.current_chunk_index < previous.current_chunk_index
                    || progress.percent < previous.percent
                    || progress == previous
                {
                    return;
                }
            }
            *last = Some(progress);
        }

        if let Some(sink) = self.sink {
            sink(progress);
        }
    }
}
