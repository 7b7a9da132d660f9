use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Persisted set of voice ids believed to be cached.
///
/// This is a hint only: the byte store can be evicted behind our back, so
/// membership must be confirmed against the store before skipping a download.
/// Persistence failures are logged and never surface to callers.
#[derive(Debug, Default)]
pub struct DownloadedSet {
    path: Option<PathBuf>,
    ids: Mutex<BTreeSet<String>>,
    /// Serializes writers so the newest snapshot is always the last written.
    write_lock: tokio::sync::Mutex<()>,
}

impl DownloadedSet {
    /// A set that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read the persisted id list.
    ///
    /// A missing, unreadable or malformed file yields an empty set.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match fs::read(&path).await {
            Ok(data) => match serde_json::from_slice::<Vec<String>>(&data) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    log::warn!("Ignoring malformed downloaded list {}: {e}", path.display());
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                log::warn!("Failed to read downloaded list {}: {e}", path.display());
                BTreeSet::new()
            }
        };

        log::debug!("Loaded {} downloaded voice ids", ids.len());
        Self {
            path: Some(path),
            ids: Mutex::new(ids),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    /// Ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.ids.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// Record `id` and persist. Returns whether it was new.
    pub async fn insert(&self, id: &str) -> bool {
        let inserted = self.ids.lock().insert(id.to_string());
        self.persist_logged().await;
        inserted
    }

    /// Forget `id`, persisting only when something changed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.ids.lock().remove(id);
        if removed {
            self.persist_logged().await;
        }
        removed
    }

    /// Write the id list as a JSON array.
    ///
    /// The file is replaced atomically; a reader never sees a partial list.
    pub async fn persist(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        // Snapshot only once the lock is held.
        let json = serde_json::to_vec(&self.ids())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            log::warn!("Failed to persist downloaded voice list: {e}");
        }
    }
}
