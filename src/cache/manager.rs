use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::downloaded::DownloadedSet;
use super::store::{AssetKind, ByteStore, StoreError};
use crate::catalog::{get_model_paths, Voice};
use crate::config::DownloadMilestones;
use crate::fetch::AssetFetcher;

/// Download failures, tagged by stage.
///
/// `Clone` so every caller awaiting a deduplicated download gets the outcome.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("No model files found for voice {0}")]
    NoModelFiles(String),
    #[error("Failed to download model file for voice {voice}: {reason}")]
    ModelDownload { voice: String, reason: String },
    #[error("Failed to download config file for voice {voice}: {reason}")]
    ConfigDownload { voice: String, reason: String },
    #[error("Failed to store {kind} asset for voice {voice}: {reason}")]
    Store {
        voice: String,
        kind: AssetKind,
        reason: String,
    },
}

/// Both cached assets of one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAssets {
    pub voice_id: String,
    pub model: Bytes,
    pub config: Bytes,
}

type DownloadSlot = Arc<OnceCell<Result<(), DownloadError>>>;

/// Checks, downloads and evicts voice assets in the byte store.
///
/// The only writer of both the store and the [`DownloadedSet`] hint.
pub struct ModelCacheManager {
    store: Arc<dyn ByteStore>,
    fetcher: Arc<dyn AssetFetcher>,
    downloaded: Arc<DownloadedSet>,
    milestones: DownloadMilestones,
    in_flight: Mutex<HashMap<String, DownloadSlot>>,
}

impl ModelCacheManager {
    pub fn new(
        store: Arc<dyn ByteStore>,
        fetcher: Arc<dyn AssetFetcher>,
        downloaded: Arc<DownloadedSet>,
    ) -> Self {
        Self {
            store,
            fetcher,
            downloaded,
            milestones: DownloadMilestones::default(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_milestones(mut self, milestones: DownloadMilestones) -> Self {
        self.milestones = milestones;
        self
    }

    pub fn downloaded(&self) -> &Arc<DownloadedSet> {
        &self.downloaded
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    /// True only if both assets are present and non-empty.
    ///
    /// Only checks for existence; the assets are not read. Any failure along
    /// the way (no model file in the catalog entry, store error) reads as
    /// "not cached".
    pub async fn is_model_cached(&self, voice: &Voice) -> bool {
        if let Err(e) = get_model_paths(voice) {
            log::warn!("Cannot check cache for {}: {e}", voice.id);
            return false;
        }

        for kind in [AssetKind::Model, AssetKind::Config] {
            match self.store.exists(&voice.id, kind).await {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("Cache miss: {} ({kind})", voice.id);
                    return false;
                }
                Err(e) => {
                    log::warn!("Cache check failed for {} ({kind}): {e}", voice.id);
                    return false;
                }
            }
        }
        true
    }

    /// Read both assets, or `None` if either is missing, empty or unreadable.
    pub async fn load_assets(&self, voice: &Voice) -> Option<ModelAssets> {
        if let Err(e) = get_model_paths(voice) {
            log::warn!("Cannot check cache for {}: {e}", voice.id);
            return None;
        }

        let model = self.read_asset(voice, AssetKind::Model).await?;
        let config = self.read_asset(voice, AssetKind::Config).await?;

        log::debug!("Cache hit: {}", voice.id);
        Some(ModelAssets {
            voice_id: voice.id.clone(),
            model,
            config,
        })
    }

    async fn read_asset(&self, voice: &Voice, kind: AssetKind) -> Option<Bytes> {
        match self.store.get(&voice.id, kind).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                log::debug!("Cache miss: {} ({kind})", voice.id);
                None
            }
            Err(e) => {
                log::warn!("Cache read failed for {} ({kind}): {e}", voice.id);
                None
            }
        }
    }

    /// Check the store and bring the downloaded hint in line with it.
    pub async fn verify_model_cache(&self, voice: &Voice) -> bool {
        let cached = self.is_model_cached(voice).await;
        if cached {
            self.downloaded.insert(&voice.id).await;
        } else if self.downloaded.remove(&voice.id).await {
            log::info!("Voice {} was evicted from the cache", voice.id);
        }
        cached
    }

    /// Download the voice unless the store already holds it.
    pub async fn ensure_model(
        &self,
        voice: &Voice,
        on_progress: Option<&(dyn Fn(u8) + Send + Sync)>,
    ) -> Result<(), DownloadError> {
        if self.verify_model_cache(voice).await {
            return Ok(());
        }
        self.download_model(voice, on_progress).await
    }

    /// Fetch and persist the model asset, then the config asset.
    ///
    /// On success `on_progress` sees exactly the configured milestones in
    /// order. A concurrent call for a voice that is already downloading waits
    /// for that download instead of fetching again; only the first caller's
    /// callback receives milestones.
    pub async fn download_model(
        &self,
        voice: &Voice,
        on_progress: Option<&(dyn Fn(u8) + Send + Sync)>,
    ) -> Result<(), DownloadError> {
        let slot = self
            .in_flight
            .lock()
            .entry(voice.id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = slot
            .get_or_init(|| self.fetch_and_store(voice, on_progress))
            .await
            .clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&voice.id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            in_flight.remove(&voice.id);
        }

        result
    }

    async fn fetch_and_store(
        &self,
        voice: &Voice,
        on_progress: Option<&(dyn Fn(u8) + Send + Sync)>,
    ) -> Result<(), DownloadError> {
        let report = |percent: u8| {
            if let Some(callback) = on_progress {
                callback(percent);
            }
        };

        let paths =
            get_model_paths(voice).map_err(|_| DownloadError::NoModelFiles(voice.id.clone()))?;
        log::info!("Downloading voice {} from {}", voice.id, paths.model_path);

        let model = self
            .fetcher
            .fetch(&paths.model_path)
            .await
            .map_err(|e| DownloadError::ModelDownload {
                voice: voice.id.clone(),
                reason: e.to_string(),
            })?;
        report(self.milestones.model_fetched);

        self.put(voice, AssetKind::Model, model).await?;
        report(self.milestones.model_stored);

        let config = self
            .fetcher
            .fetch(&paths.config_path)
            .await
            .map_err(|e| DownloadError::ConfigDownload {
                voice: voice.id.clone(),
                reason: e.to_string(),
            })?;
        self.put(voice, AssetKind::Config, config).await?;

        self.downloaded.insert(&voice.id).await;
        log::info!("Voice {} downloaded", voice.id);
        report(self.milestones.complete);
        Ok(())
    }

    async fn put(&self, voice: &Voice, kind: AssetKind, bytes: Bytes) -> Result<(), DownloadError> {
        self.store
            .put(&voice.id, kind, bytes)
            .await
            .map_err(|e| DownloadError::Store {
                voice: voice.id.clone(),
                kind,
                reason: e.to_string(),
            })
    }

    /// Remove both assets and the downloaded hint.
    pub async fn delete_model(&self, voice: &Voice) -> Result<(), StoreError> {
        self.store.delete(&voice.id, AssetKind::Model).await?;
        self.store.delete(&voice.id, AssetKind::Config).await?;
        self.downloaded.remove(&voice.id).await;
        log::info!("Deleted cached voice {}", voice.id);
        Ok(())
    }
}
