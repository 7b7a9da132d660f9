//! Command-driven front end for embedding the core behind a UI.
//!
//! A [`Session`] owns the current language and voice selection. Commands go in
//! through a [`SessionHandle`]; progress, results and errors come back as
//! [`SessionEvent`]s on an unbounded channel. Downloads and synthesis runs are
//! spawned so a newer `Generate` can supersede one still in flight.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::catalog::Voice;
use crate::context::TtsContext;
use crate::language::{detect_language, find_matching_language_code};
use crate::synthesis::{SynthesisError, SynthesisOrchestrator, SynthesisProgress};
use crate::{AudioResult, InferenceEngine};

#[derive(Debug)]
pub enum SessionCommand {
    SelectLanguage(String),
    SelectVoice(String),
    /// Detect the language of `text` and switch to it when supported
    DetectLanguage(String),
    /// Download the selected voice
    Download,
    Generate {
        text: String,
        playback_rate: f32,
    },
    Shutdown {
        ack_tx: Option<oneshot::Sender<()>>,
    },
}

/// Which retry action an error calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Selection problem: pick another voice or language
    Voice,
    /// Voice unavailable: download again
    Download,
    /// Synthesis failed mid-run: generate again
    Synthesis,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LanguageChanged(String),
    VoiceChanged {
        voice_id: String,
        cached: bool,
    },
    LanguageDetected {
        detected: Option<String>,
        /// Catalog language the detection resolved to, if any
        matched: Option<String>,
    },
    DownloadProgress {
        voice_id: String,
        percent: u8,
    },
    Downloaded(String),
    SynthesisProgress(SynthesisProgress),
    AudioReady(Arc<AudioResult>),
    Error {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,
}

/// Cloneable sender side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.sender.send(command).map_err(|_| SessionError::Closed)
    }

    pub fn select_language(&self, code: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SelectLanguage(code.into()))
    }

    pub fn select_voice(&self, voice_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SelectVoice(voice_id.into()))
    }

    pub fn detect_language(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::DetectLanguage(text.into()))
    }

    pub fn download(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Download)
    }

    pub fn generate(&self, text: impl Into<String>, playback_rate: f32) -> Result<(), SessionError> {
        self.send(SessionCommand::Generate {
            text: text.into(),
            playback_rate,
        })
    }

    /// Stop the session, cancel any run in flight and persist the downloaded
    /// hint. Resolves once the worker has finished.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown {
            ack_tx: Some(ack_tx),
        })?;
        ack_rx.await.map_err(|_| SessionError::Closed)
    }
}

pub struct Session {
    context: Arc<TtsContext>,
    orchestrator: Arc<SynthesisOrchestrator>,
    events: mpsc::UnboundedSender<SessionEvent>,
    language: Option<String>,
    voice: Option<Voice>,
}

impl Session {
    /// Start a session worker on the current tokio runtime.
    ///
    /// The worker selects the catalog's default language and voice before
    /// taking commands.
    pub fn spawn(
        context: Arc<TtsContext>,
        engine: Arc<dyn InferenceEngine>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let session = Session {
            orchestrator: Arc::new(context.orchestrator(engine)),
            context,
            events: event_tx,
            language: None,
            voice: None,
        };
        tokio::spawn(session.run(command_rx));

        (SessionHandle { sender: command_tx }, event_rx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        if let Some(code) = self
            .context
            .catalog()
            .default_language()
            .map(|l| l.code.clone())
        {
            self.change_language(&code).await;
        } else {
            log::warn!("Voice catalog is empty");
        }

        while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::SelectLanguage(code) => self.change_language(&code).await,
                SessionCommand::SelectVoice(id) => self.change_voice(&id).await,
                SessionCommand::DetectLanguage(text) => self.detect(&text).await,
                SessionCommand::Download => self.spawn_download(),
                SessionCommand::Generate {
                    text,
                    playback_rate,
                } => self.spawn_generate(text, playback_rate),
                SessionCommand::Shutdown { ack_tx } => {
                    commands.close();
                    self.orchestrator.cancel();
                    if let Err(e) = self.context.shutdown().await {
                        log::warn!("Session shutdown: {e}");
                    }
                    if let Some(tx) = ack_tx {
                        let _ = tx.send(());
                    }
                    break;
                }
            }
        }
        log::debug!("Session worker stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) {
        self.emit(SessionEvent::Error {
            kind,
            message: message.into(),
        });
    }

    async fn change_language(&mut self, code: &str) {
        let catalog = self.context.catalog();
        if catalog.language(code).is_none() {
            self.error(ErrorKind::Voice, format!("No voices for language {code}"));
            return;
        }

        self.language = Some(code.to_string());
        self.emit(SessionEvent::LanguageChanged(code.to_string()));

        match catalog.default_voice_for_language(code).map(|v| v.id.clone()) {
            Some(id) => self.change_voice(&id).await,
            None => self.voice = None,
        }
    }

    async fn change_voice(&mut self, voice_id: &str) {
        let Some(voice) = self.context.catalog().get(voice_id).cloned() else {
            self.error(ErrorKind::Voice, format!("Unknown voice {voice_id}"));
            return;
        };

        let cached = self.context.cache().verify_model_cache(&voice).await;
        self.emit(SessionEvent::VoiceChanged {
            voice_id: voice.id.clone(),
            cached,
        });
        self.voice = Some(voice);
    }

    async fn detect(&mut self, text: &str) {
        let detected = detect_language(text);
        let matched =
            find_matching_language_code(detected, Some(self.context.catalog().languages()));
        log::debug!("Detected language {detected:?}, matched {matched:?}");

        self.emit(SessionEvent::LanguageDetected {
            detected: detected.map(str::to_string),
            matched: matched.clone(),
        });

        if let Some(code) = matched {
            if self.language.as_deref() != Some(code.as_str()) {
                self.change_language(&code).await;
            }
        }
    }

    fn selected_voice(&self) -> Option<Voice> {
        if self.voice.is_none() {
            self.error(ErrorKind::Voice, "No voice selected");
        }
        self.voice.clone()
    }

    fn spawn_download(&self) {
        let Some(voice) = self.selected_voice() else {
            return;
        };
        let context = self.context.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            download(&context, &voice, &events).await;
        });
    }

    fn spawn_generate(&self, text: String, playback_rate: f32) {
        let Some(voice) = self.selected_voice() else {
            return;
        };
        if text.trim().is_empty() {
            self.error(ErrorKind::Synthesis, SynthesisError::EmptyText.to_string());
            return;
        }

        let complete = self.context.config().download.complete;
        let orchestrator = self.orchestrator.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let download_events = events.clone();
            let voice_id = voice.id.clone();
            let on_download = move |percent: u8| {
                let _ = download_events.send(SessionEvent::DownloadProgress {
                    voice_id: voice_id.clone(),
                    percent,
                });
                if percent == complete {
                    let _ = download_events.send(SessionEvent::Downloaded(voice_id.clone()));
                }
            };

            let progress_events = events.clone();
            let on_progress = move |progress: SynthesisProgress| {
                let _ = progress_events.send(SessionEvent::SynthesisProgress(progress));
            };

            match orchestrator
                .generate_audio_with_download(
                    &text,
                    &voice,
                    playback_rate,
                    Some(&on_download),
                    Some(&on_progress),
                )
                .await
            {
                Ok(audio) => {
                    let _ = events.send(SessionEvent::AudioReady(Arc::new(audio)));
                }
                Err(SynthesisError::Superseded) => {}
                Err(e) => {
                    let kind = if e.is_retryable_by_download() {
                        ErrorKind::Download
                    } else {
                        ErrorKind::Synthesis
                    };
                    let _ = events.send(SessionEvent::Error {
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

/// Download `voice`, forwarding milestones as events.
async fn download(
    context: &TtsContext,
    voice: &Voice,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let progress_events = events.clone();
    let voice_id = voice.id.clone();
    let on_progress = move |percent: u8| {
        let _ = progress_events.send(SessionEvent::DownloadProgress {
            voice_id: voice_id.clone(),
            percent,
        });
    };

    match context.cache().download_model(voice, Some(&on_progress)).await {
        Ok(()) => {
            let _ = events.send(SessionEvent::Downloaded(voice.id.clone()));
        }
        Err(e) => {
            let _ = events.send(SessionEvent::Error {
                kind: ErrorKind::Download,
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::{AssetKind, ByteStore, DownloadedSet, MemoryByteStore, ModelAssets};
    use crate::catalog::VoiceCatalog;
    use crate::config::TtsConfig;
    use crate::fetch::{AssetFetcher, FetchError};
    use crate::Waveform;

    #[derive(Default)]
    struct FakeFetcher {
        fail: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetFetcher for FakeFetcher {
        async fn fetch(&self, path: &str) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(FetchError::Status {
                    url: path.to_string(),
                    status: 404,
                });
            }
            Ok(Bytes::from(format!("bytes of {path}")))
        }
    }

    struct FakeEngine;

    #[async_trait]
    impl InferenceEngine for FakeEngine {
        async fn synthesize(
            &self,
            text: &str,
            _assets: &ModelAssets,
            _on_progress: &(dyn Fn(f32) + Send + Sync),
        ) -> Result<Waveform, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Waveform::mono(vec![0.0; text.len()], 16000))
        }
    }

    const CATALOG: &str = r#"{
        "en_GB-alan-low": {
            "name": "alan",
            "language": {"code": "en_GB", "family": "en", "name_english": "English"},
            "quality": "low",
            "files": {
                "en/en_GB/alan/low/en_GB-alan-low.onnx": {"size_bytes": 10},
                "en/en_GB/alan/low/en_GB-alan-low.onnx.json": {"size_bytes": 2}
            }
        },
        "de_DE-thorsten-medium": {
            "name": "thorsten",
            "language": {"code": "de_DE", "family": "de", "name_english": "German"},
            "quality": "medium",
            "files": {
                "de/de_DE/thorsten/medium/de_DE-thorsten-medium.onnx": {"size_bytes": 10},
                "de/de_DE/thorsten/medium/de_DE-thorsten-medium.onnx.json": {"size_bytes": 2}
            }
        }
    }"#;

    fn start_with(
        store: Arc<MemoryByteStore>,
        fetcher: Arc<FakeFetcher>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let context = TtsContext::with_parts(
            TtsConfig::default(),
            VoiceCatalog::from_json(CATALOG).unwrap(),
            store,
            fetcher,
            Arc::new(DownloadedSet::in_memory()),
        );
        Session::spawn(Arc::new(context), Arc::new(FakeEngine))
    }

    fn start(fail_downloads: bool) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        start_with(
            Arc::new(MemoryByteStore::new()),
            Arc::new(FakeFetcher {
                fail: fail_downloads,
                ..Default::default()
            }),
        )
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session closed")
    }

    async fn expect_initial_selection(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
        assert!(matches!(next(events).await, SessionEvent::LanguageChanged(code) if code == "en_GB"));
        assert!(matches!(
            next(events).await,
            SessionEvent::VoiceChanged { voice_id, cached: false } if voice_id == "en_GB-alan-low"
        ));
    }

    #[tokio::test]
    async fn generate_downloads_then_synthesizes() {
        let (handle, mut events) = start(false);
        expect_initial_selection(&mut events).await;

        handle.generate("Hello there.", 1.0).unwrap();

        let mut percents = Vec::new();
        loop {
            match next(&mut events).await {
                SessionEvent::DownloadProgress { percent, .. } => percents.push(percent),
                SessionEvent::Downloaded(id) => {
                    assert_eq!(id, "en_GB-alan-low");
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(percents, vec![25, 75, 100]);

        let audio = loop {
            match next(&mut events).await {
                SessionEvent::SynthesisProgress(p) => assert_eq!(p.total_chunks, 1),
                SessionEvent::AudioReady(audio) => break audio,
                other => panic!("unexpected event {other:?}"),
            }
        };
        assert_eq!(audio.samples.len(), "Hello there.".len());

        handle.shutdown().await.unwrap();
        assert_eq!(handle.download(), Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn detection_switches_to_family_match() {
        let (handle, mut events) = start(false);
        expect_initial_selection(&mut events).await;

        handle.select_language("de_DE").unwrap();
        assert!(matches!(next(&mut events).await, SessionEvent::LanguageChanged(code) if code == "de_DE"));
        assert!(matches!(next(&mut events).await, SessionEvent::VoiceChanged { .. }));

        handle
            .detect_language("Hello world, this is a test that is long enough to detect.")
            .unwrap();
        match next(&mut events).await {
            SessionEvent::LanguageDetected { detected, matched } => {
                assert_eq!(detected.as_deref(), Some("en_US"));
                assert_eq!(matched.as_deref(), Some("en_GB"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(next(&mut events).await, SessionEvent::LanguageChanged(code) if code == "en_GB"));
    }

    #[tokio::test]
    async fn unsupported_detection_keeps_language() {
        let (handle, mut events) = start(false);
        expect_initial_selection(&mut events).await;

        handle
            .detect_language("你好世界，这是一个测试，需要足够长的文本。")
            .unwrap();
        match next(&mut events).await {
            SessionEvent::LanguageDetected { detected, matched } => {
                assert_eq!(detected.as_deref(), Some("zh_CN"));
                assert_eq!(matched, None);
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.select_voice("nope").unwrap();
        assert!(matches!(
            next(&mut events).await,
            SessionEvent::Error { kind: ErrorKind::Voice, .. }
        ));
    }

    #[tokio::test]
    async fn failed_download_reports_download_error() {
        let (handle, mut events) = start(true);
        expect_initial_selection(&mut events).await;

        handle.download().unwrap();
        match next(&mut events).await {
            SessionEvent::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::Download);
                assert!(message.starts_with("Failed to download model file"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn newer_generate_supersedes_one_still_downloading() {
        let store = Arc::new(MemoryByteStore::new());
        store
            .put("de_DE-thorsten-medium", AssetKind::Model, Bytes::from_static(b"onnx"))
            .await
            .unwrap();
        store
            .put("de_DE-thorsten-medium", AssetKind::Config, Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let fetcher = Arc::new(FakeFetcher {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let (handle, mut events) = start_with(store, fetcher.clone());
        expect_initial_selection(&mut events).await;

        handle.generate("stale request from first voice", 1.0).unwrap();
        while fetcher.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        handle.select_voice("de_DE-thorsten-medium").unwrap();
        assert!(matches!(
            next(&mut events).await,
            SessionEvent::VoiceChanged { voice_id, cached: true } if voice_id == "de_DE-thorsten-medium"
        ));
        handle.generate("fresh", 1.0).unwrap();

        let audio = loop {
            match next(&mut events).await {
                SessionEvent::SynthesisProgress(_) => {}
                SessionEvent::AudioReady(audio) => break audio,
                other => panic!("unexpected event {other:?}"),
            }
        };
        assert_eq!(audio.samples.len(), "fresh".len());

        // Let the stale download finish; its run must stay silent.
        tokio::time::sleep(Duration::from_millis(600)).await;
        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                assert!(
                    !matches!(
                        event,
                        SessionEvent::AudioReady(_) | SessionEvent::DownloadProgress { .. }
                    ),
                    "stale run emitted {event:?}"
                );
            }
        })
        .await
        .expect("event channel never closed");
    }
}
