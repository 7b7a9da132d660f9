use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::progress::{ProgressTracker, SynthesisProgress};
use super::state::RunState;
use crate::cache::{DownloadError, ModelCacheManager};
use crate::catalog::Voice;
use crate::config::SegmentationConfig;
use crate::text::{chunk_text, Chunk};
use crate::{AudioResult, InferenceEngine, Waveform};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Nothing to synthesize")]
    EmptyText,
    #[error("Voice unavailable: {0}")]
    Download(#[from] DownloadError),
    #[error("Assets for voice {0} disappeared from the cache")]
    AssetsMissing(String),
    #[error("Synthesis failed on chunk {chunk_index}: {reason}")]
    Chunk { chunk_index: usize, reason: String },
    #[error("Chunk {chunk_index} audio format differs from the first chunk")]
    FormatMismatch { chunk_index: usize },
    #[error("Run superseded by a newer request")]
    Superseded,
}

impl SynthesisError {
    /// Whether the voice itself is the problem, so retrying means downloading
    /// again rather than regenerating.
    pub fn is_retryable_by_download(&self) -> bool {
        matches!(
            self,
            SynthesisError::Download(_) | SynthesisError::AssetsMissing(_)
        )
    }
}

/// Drives one synthesis run at a time over a cache manager and an engine.
///
/// Chunks run strictly in order. Starting a new run makes every older run
/// return [`SynthesisError::Superseded`] at its next suspension point; an
/// inference call already in flight is never interrupted, only its result
/// discarded.
pub struct SynthesisOrchestrator {
    cache: Arc<ModelCacheManager>,
    engine: Arc<dyn InferenceEngine>,
    segmentation: SegmentationConfig,
    run_token: AtomicU64,
    state: Mutex<RunState>,
}

impl SynthesisOrchestrator {
    pub fn new(cache: Arc<ModelCacheManager>, engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            cache,
            engine,
            segmentation: SegmentationConfig::default(),
            run_token: AtomicU64::new(0),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn with_segmentation(mut self, segmentation: SegmentationConfig) -> Self {
        self.segmentation = segmentation;
        self
    }

    /// State of the most recent run.
    pub fn state(&self) -> RunState {
        self.state.lock().clone()
    }

    /// Invalidate whatever run is in flight without starting a new one.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        self.run_token.fetch_add(1, Ordering::SeqCst);
        *state = RunState::Idle;
    }

    /// Synthesize `text` with `voice`, downloading the voice first if needed.
    ///
    /// All or nothing: a failing chunk discards everything produced so far.
    /// `playback_rate` is attached to the result, not applied to the samples.
    /// Blank text is rejected without starting a run, so it leaves any run in
    /// flight alone.
    pub async fn generate_audio(
        &self,
        text: &str,
        voice: &Voice,
        playback_rate: f32,
        on_progress: Option<&(dyn Fn(SynthesisProgress) + Send + Sync)>,
    ) -> Result<AudioResult, SynthesisError> {
        self.generate_audio_with_download(text, voice, playback_rate, None, on_progress)
            .await
    }

    /// [`generate_audio`](Self::generate_audio), also reporting download
    /// milestones when the voice has to be fetched first.
    ///
    /// The run starts before the download, so a newer run supersedes this one
    /// even while it is still waiting on the network.
    pub async fn generate_audio_with_download(
        &self,
        text: &str,
        voice: &Voice,
        playback_rate: f32,
        on_download: Option<&(dyn Fn(u8) + Send + Sync)>,
        on_progress: Option<&(dyn Fn(SynthesisProgress) + Send + Sync)>,
    ) -> Result<AudioResult, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let token = self.begin_run();

        self.advance(token, RunState::EnsuringModel)?;
        let download_progress = |percent: u8| {
            if let Some(callback) = on_download {
                if self.is_current(token) {
                    callback(percent);
                }
            }
        };
        let ensured = self
            .cache
            .ensure_model(voice, Some(&download_progress))
            .await;
        self.check_current(token)?;
        if let Err(e) = ensured {
            return self.fail(token, e.into());
        }
        let Some(assets) = self.cache.load_assets(voice).await else {
            self.check_current(token)?;
            return self.fail(token, SynthesisError::AssetsMissing(voice.id.clone()));
        };
        self.check_current(token)?;

        self.advance(token, RunState::Segmenting)?;
        let budget = self.segmentation.budget_for(text);
        let chunks = Chunk::sequence(chunk_text(text, Some(budget)));
        let total = chunks.len();
        log::info!(
            "Synthesizing {} chars with {} in {} chunk(s), budget {}",
            text.chars().count(),
            voice.id,
            total,
            budget
        );

        let tracker = ProgressTracker::new(total, on_progress);
        let mut waveforms: Vec<Waveform> = Vec::with_capacity(total);

        for chunk in &chunks {
            let index = chunk.sequence_index;
            self.advance(token, RunState::SynthesizingChunk(index))?;

            let sub_progress = |fraction: f32| {
                if self.is_current(token) {
                    tracker.chunk_progress(index, fraction);
                }
            };

            let started = Instant::now();
            let outcome = self
                .engine
                .synthesize(&chunk.text, &assets, &sub_progress)
                .await;
            self.check_current(token)?;

            let waveform = match outcome {
                Ok(waveform) => waveform,
                Err(e) => {
                    log::warn!("Chunk {}/{} failed: {e}", index + 1, total);
                    return self.fail(
                        token,
                        SynthesisError::Chunk {
                            chunk_index: index,
                            reason: e.to_string(),
                        },
                    );
                }
            };

            if let Some(first) = waveforms.first() {
                if first.sample_rate != waveform.sample_rate
                    || first.channel_count != waveform.channel_count
                {
                    return self.fail(token, SynthesisError::FormatMismatch { chunk_index: index });
                }
            }

            log::debug!(
                "Chunk {}/{} synthesized in {:.2?} ({:.2}s audio)",
                index + 1,
                total,
                started.elapsed(),
                waveform.duration_secs()
            );
            waveforms.push(waveform);
            tracker.chunk_done(index);
        }

        self.advance(token, RunState::Concatenating)?;
        let result = AudioResult::concatenate(waveforms, playback_rate)
            .map_err(|chunk_index| SynthesisError::FormatMismatch { chunk_index })?;

        self.advance(token, RunState::Done)?;
        log::info!(
            "Synthesized {:.2}s of audio for {}",
            result.duration_secs(),
            voice.id
        );
        Ok(result)
    }

    fn begin_run(&self) -> u64 {
        let mut state = self.state.lock();
        let token = self.run_token.fetch_add(1, Ordering::SeqCst) + 1;
        *state = RunState::Idle;
        token
    }

    fn is_current(&self, token: u64) -> bool {
        self.run_token.load(Ordering::SeqCst) == token
    }

    fn check_current(&self, token: u64) -> Result<(), SynthesisError> {
        if self.is_current(token) {
            Ok(())
        } else {
            log::debug!("Run {token} superseded");
            Err(SynthesisError::Superseded)
        }
    }

    /// Move the run to `next`, unless a newer run owns the state.
    fn advance(&self, token: u64, next: RunState) -> Result<(), SynthesisError> {
        let mut state = self.state.lock();
        if !self.is_current(token) {
            log::debug!("Run {token} superseded before {next}");
            return Err(SynthesisError::Superseded);
        }
        if !state.can_advance_to(&next) {
            log::warn!("Ignoring run transition {} -> {}", *state, next);
            return Ok(());
        }
        log::debug!("Run {token}: {} -> {}", *state, next);
        *state = next;
        Ok(())
    }

    fn fail<T>(&self, token: u64, error: SynthesisError) -> Result<T, SynthesisError> {
        self.advance(token, RunState::Failed(error.to_string()))?;
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::cache::{AssetKind, ByteStore, DownloadedSet, MemoryByteStore, ModelAssets};
    use crate::catalog::{Language, Quality, VoiceFile};
    use crate::fetch::{AssetFetcher, FetchError};

    const SAMPLE_RATE: u32 = 1000;

    /// Ten samples per character; fails on selected calls.
    #[derive(Default)]
    struct FakeEngine {
        calls: Mutex<Vec<String>>,
        fail_on: HashSet<usize>,
        stereo_on: HashSet<usize>,
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeEngine {
        fn texts(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl InferenceEngine for FakeEngine {
        async fn synthesize(
            &self,
            text: &str,
            _assets: &ModelAssets,
            on_progress: &(dyn Fn(f32) + Send + Sync),
        ) -> Result<Waveform, Box<dyn std::error::Error + Send + Sync>> {
            let call = {
                let mut calls = self.calls.lock();
                calls.push(text.to_string());
                calls.len() - 1
            };
            if let Some(gate) = &self.gate {
                gate.acquire().await?.forget();
            }
            if self.fail_on.contains(&call) {
                return Err(format!("engine crashed on {text:?}").into());
            }
            on_progress(0.5);
            let channel_count = if self.stereo_on.contains(&call) { 2 } else { 1 };
            Ok(Waveform {
                samples: vec![0.25; text.chars().count() * 10 * channel_count as usize],
                sample_rate: SAMPLE_RATE,
                channel_count,
            })
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl AssetFetcher for CountingFetcher {
        async fn fetch(&self, path: &str) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if self.fail {
                return Err(FetchError::Status {
                    url: path.to_string(),
                    status: 503,
                });
            }
            Ok(Bytes::from(format!("bytes of {path}")))
        }
    }

    fn test_voice() -> Voice {
        Voice {
            id: "en_US-test-medium".to_string(),
            name: "test".to_string(),
            language: Language {
                code: "en_US".to_string(),
                ..Default::default()
            },
            quality: Quality::Medium,
            files: vec![
                ("en_US-test-medium.onnx".to_string(), VoiceFile::default()),
                ("en_US-test-medium.onnx.json".to_string(), VoiceFile::default()),
            ],
            num_speakers: None,
        }
    }

    async fn cached_manager(fetcher: Arc<CountingFetcher>) -> Arc<ModelCacheManager> {
        let store = Arc::new(MemoryByteStore::new());
        store
            .put("en_US-test-medium", AssetKind::Model, Bytes::from_static(b"onnx"))
            .await
            .unwrap();
        store
            .put("en_US-test-medium", AssetKind::Config, Bytes::from_static(b"{}"))
            .await
            .unwrap();
        Arc::new(ModelCacheManager::new(
            store,
            fetcher,
            Arc::new(DownloadedSet::in_memory()),
        ))
    }

    fn empty_manager(fetcher: Arc<CountingFetcher>) -> Arc<ModelCacheManager> {
        Arc::new(ModelCacheManager::new(
            Arc::new(MemoryByteStore::new()),
            fetcher,
            Arc::new(DownloadedSet::in_memory()),
        ))
    }

    /// Segmentation budget that splits the three-sentence test text per sentence.
    fn small_budget() -> SegmentationConfig {
        SegmentationConfig {
            max_chars: 20,
            cjk_max_chars: 20,
        }
    }

    const THREE_SENTENCES: &str = "First one here. Second one here. Third one here.";

    #[tokio::test]
    async fn three_chunks_report_ordered_progress() {
        let engine = Arc::new(FakeEngine::default());
        let orchestrator = SynthesisOrchestrator::new(
            cached_manager(Arc::new(CountingFetcher::default())).await,
            engine.clone(),
        )
        .with_segmentation(small_budget());

        let seen = Mutex::new(Vec::new());
        let sink = |p: SynthesisProgress| seen.lock().push(p);
        let audio = orchestrator
            .generate_audio(THREE_SENTENCES, &test_voice(), 1.25, Some(&sink))
            .await
            .unwrap();

        let texts = engine.texts();
        assert_eq!(
            texts,
            vec!["First one here.", "Second one here.", "Third one here."]
        );

        let seen = seen.into_inner();
        let indices: Vec<usize> = seen.iter().map(|p| p.current_chunk_index).collect();
        let mut distinct = indices.clone();
        distinct.dedup();
        assert_eq!(distinct, vec![1, 2, 3]);
        assert!(seen.iter().all(|p| p.total_chunks == 3));
        assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(seen.last().map(|p| p.percent), Some(100.0));

        let expected: f64 = texts
            .iter()
            .map(|t| Waveform::mono(vec![0.0; t.chars().count() * 10], SAMPLE_RATE).duration_secs())
            .sum();
        assert!((audio.duration_secs() - expected).abs() < 1e-9);
        assert_eq!(audio.sample_rate, SAMPLE_RATE);
        assert_eq!(audio.playback_rate, 1.25);
        assert_eq!(orchestrator.state(), RunState::Done);
    }

    #[tokio::test]
    async fn failing_chunk_aborts_remaining_chunks() {
        let engine = Arc::new(FakeEngine {
            fail_on: HashSet::from([1]),
            ..Default::default()
        });
        let orchestrator = SynthesisOrchestrator::new(
            cached_manager(Arc::new(CountingFetcher::default())).await,
            engine.clone(),
        )
        .with_segmentation(small_budget());

        let err = orchestrator
            .generate_audio(THREE_SENTENCES, &test_voice(), 1.0, None)
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::Chunk { chunk_index: 1, .. }));
        assert!(!err.is_retryable_by_download());
        assert_eq!(engine.texts().len(), 2);
        assert!(matches!(orchestrator.state(), RunState::Failed(_)));
    }

    #[tokio::test]
    async fn downloads_missing_voice_before_synthesis() {
        let fetcher = Arc::new(CountingFetcher::default());
        let manager = empty_manager(fetcher.clone());
        let orchestrator =
            SynthesisOrchestrator::new(manager.clone(), Arc::new(FakeEngine::default()));

        orchestrator
            .generate_audio("Hello there, world.", &test_voice(), 1.0, None)
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(manager.downloaded().contains("en_US-test-medium"));
    }

    #[tokio::test]
    async fn download_failure_is_retryable_by_download() {
        let engine = Arc::new(FakeEngine::default());
        let orchestrator = SynthesisOrchestrator::new(
            empty_manager(Arc::new(CountingFetcher {
                fail: true,
                ..Default::default()
            })),
            engine.clone(),
        );

        let err = orchestrator
            .generate_audio("Hello there, world.", &test_voice(), 1.0, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SynthesisError::Download(DownloadError::ModelDownload { .. })
        ));
        assert!(err.is_retryable_by_download());
        assert!(engine.texts().is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_download() {
        let fetcher = Arc::new(CountingFetcher::default());
        let orchestrator =
            SynthesisOrchestrator::new(empty_manager(fetcher.clone()), Arc::new(FakeEngine::default()));

        let err = orchestrator
            .generate_audio(" \n\n ", &test_voice(), 1.0, None)
            .await
            .unwrap_err();
        assert_eq!(err, SynthesisError::EmptyText);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.state(), RunState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_waiting_on_download_is_superseded() {
        let fetch_gate = Arc::new(Semaphore::new(0));
        let fetcher = Arc::new(CountingFetcher {
            gate: Some(fetch_gate.clone()),
            ..Default::default()
        });
        let engine = Arc::new(FakeEngine::default());
        let orchestrator = Arc::new(SynthesisOrchestrator::new(
            empty_manager(fetcher.clone()),
            engine.clone(),
        ));

        let stale_downloads = Arc::new(AtomicUsize::new(0));
        let stale = {
            let orchestrator = orchestrator.clone();
            let stale_downloads = stale_downloads.clone();
            tokio::spawn(async move {
                let on_download = move |_: u8| {
                    stale_downloads.fetch_add(1, Ordering::SeqCst);
                };
                orchestrator
                    .generate_audio_with_download(
                        "The stale request.",
                        &test_voice(),
                        1.0,
                        Some(&on_download),
                        None,
                    )
                    .await
            })
        };

        // The stale run has started once its download is parked on the fetcher.
        while fetcher.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fresh = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .generate_audio("Fresh.", &test_voice(), 1.0, None)
                    .await
            })
        };
        while orchestrator.run_token.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        // Both assets of the shared download.
        fetch_gate.add_permits(2);

        let audio = fresh.await.unwrap().unwrap();
        assert_eq!(audio.samples.len(), "Fresh.".len() * 10);
        assert_eq!(stale.await.unwrap(), Err(SynthesisError::Superseded));
        assert_eq!(stale_downloads.load(Ordering::SeqCst), 0);
        assert_eq!(engine.texts(), vec!["Fresh."]);
        assert_eq!(orchestrator.state(), RunState::Done);
    }

    #[tokio::test]
    async fn mismatched_chunk_format_fails_run() {
        let engine = Arc::new(FakeEngine {
            stereo_on: HashSet::from([2]),
            ..Default::default()
        });
        let orchestrator = SynthesisOrchestrator::new(
            cached_manager(Arc::new(CountingFetcher::default())).await,
            engine,
        )
        .with_segmentation(small_budget());

        let err = orchestrator
            .generate_audio(THREE_SENTENCES, &test_voice(), 1.0, None)
            .await
            .unwrap_err();
        assert_eq!(err, SynthesisError::FormatMismatch { chunk_index: 2 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn newer_run_supersedes_stale_one() {
        let gate = Arc::new(Semaphore::new(0));
        let engine = Arc::new(FakeEngine {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let orchestrator = Arc::new(SynthesisOrchestrator::new(
            cached_manager(Arc::new(CountingFetcher::default())).await,
            engine.clone(),
        ));

        let stale_progress = Arc::new(AtomicUsize::new(0));
        let stale = {
            let orchestrator = orchestrator.clone();
            let stale_progress = stale_progress.clone();
            tokio::spawn(async move {
                let sink = move |_: SynthesisProgress| {
                    stale_progress.fetch_add(1, Ordering::SeqCst);
                };
                orchestrator
                    .generate_audio("The stale request.", &test_voice(), 1.0, Some(&sink))
                    .await
            })
        };

        // Wait until the stale run is parked inside the engine.
        while engine.texts().is_empty() {
            tokio::task::yield_now().await;
        }

        let fresh = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .generate_audio("The fresh request.", &test_voice(), 1.0, None)
                    .await
            })
        };
        while engine.texts().len() < 2 {
            tokio::task::yield_now().await;
        }
        gate.add_permits(2);

        assert_eq!(stale.await.unwrap(), Err(SynthesisError::Superseded));
        let audio = fresh.await.unwrap().unwrap();
        assert_eq!(audio.samples.len(), "The fresh request.".len() * 10);
        assert_eq!(stale_progress.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.state(), RunState::Done);
    }

    #[tokio::test]
    async fn cancel_invalidates_state() {
        let orchestrator = SynthesisOrchestrator::new(
            cached_manager(Arc::new(CountingFetcher::default())).await,
            Arc::new(FakeEngine::default()),
        );
        orchestrator
            .generate_audio("Hello there, world.", &test_voice(), 1.0, None)
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), RunState::Done);
        orchestrator.cancel();
        assert_eq!(orchestrator.state(), RunState::Idle);
    }
}
