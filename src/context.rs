//! Process-wide state, initialized and torn down explicitly.

use std::sync::Arc;

use crate::cache::{ByteStore, DownloadedSet, FilesystemByteStore, ModelCacheManager, StoreError};
use crate::catalog::VoiceCatalog;
use crate::config::TtsConfig;
use crate::fetch::AssetFetcher;
use crate::synthesis::SynthesisOrchestrator;
use crate::InferenceEngine;

#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    #[error("Failed to open model store: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to persist downloaded voice list: {0}")]
    Persist(#[from] std::io::Error),
}

/// Holds the voice catalog, the byte store, the downloaded hint and the cache
/// manager built over them.
///
/// Components receive the pieces they need from here instead of reaching for
/// globals.
pub struct TtsContext {
    config: TtsConfig,
    catalog: VoiceCatalog,
    store: Arc<dyn ByteStore>,
    downloaded: Arc<DownloadedSet>,
    cache: Arc<ModelCacheManager>,
}

impl TtsContext {
    /// Open the filesystem store and load the downloaded hint named by
    /// `config`.
    pub async fn initialize(
        config: TtsConfig,
        catalog: VoiceCatalog,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<Self, ContextError> {
        let store: Arc<dyn ByteStore> =
            Arc::new(FilesystemByteStore::new(&config.cache_dir).await?);
        let downloaded = Arc::new(DownloadedSet::load(&config.downloaded_list_path).await);
        log::info!(
            "Initialized TTS context: store at {}, {} voice(s) marked downloaded",
            config.cache_dir.display(),
            downloaded.len()
        );
        Ok(Self::with_parts(config, catalog, store, fetcher, downloaded))
    }

    /// Assemble a context from already constructed parts.
    pub fn with_parts(
        config: TtsConfig,
        catalog: VoiceCatalog,
        store: Arc<dyn ByteStore>,
        fetcher: Arc<dyn AssetFetcher>,
        downloaded: Arc<DownloadedSet>,
    ) -> Self {
        let cache = Arc::new(
            ModelCacheManager::new(store.clone(), fetcher, downloaded.clone())
                .with_milestones(config.download),
        );
        Self {
            config,
            catalog,
            store,
            downloaded,
            cache,
        }
    }

    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    pub fn downloaded(&self) -> &Arc<DownloadedSet> {
        &self.downloaded
    }

    pub fn cache(&self) -> &Arc<ModelCacheManager> {
        &self.cache
    }

    /// A synthesis orchestrator sharing this context's cache.
    pub fn orchestrator(&self, engine: Arc<dyn InferenceEngine>) -> SynthesisOrchestrator {
        SynthesisOrchestrator::new(self.cache.clone(), engine)
            .with_segmentation(self.config.segmentation)
    }

    /// Check every hinted voice against the store, dropping the ones that
    /// were evicted. Returns the ids still cached.
    pub async fn reconcile_downloaded(&self) -> Vec<String> {
        for id in self.downloaded.ids() {
            match self.catalog.get(&id) {
                Some(voice) => {
                    self.cache.verify_model_cache(voice).await;
                }
                None => {
                    log::info!("Forgetting downloaded voice {id}, not in catalog");
                    self.downloaded.remove(&id).await;
                }
            }
        }
        self.downloaded.ids()
    }

    /// Flush the downloaded hint to disk.
    pub async fn shutdown(&self) -> Result<(), ContextError> {
        self.downloaded.persist().await?;
        log::info!("TTS context shut down");
        Ok(())
    }
}
