//! Persistent byte store for voice assets.
//!
//! Entries are keyed by voice id and asset kind. Each put/get/delete is atomic
//! per key; nothing stronger is assumed.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// The two assets a voice needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Model,
    Config,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Model => "model",
            AssetKind::Config => "config",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal async blob store.
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn get(&self, voice_id: &str, kind: AssetKind) -> Result<Option<Bytes>, StoreError>;

    async fn put(&self, voice_id: &str, kind: AssetKind, bytes: Bytes) -> Result<(), StoreError>;

    /// Whether a non-empty entry is present, without reading it.
    async fn exists(&self, voice_id: &str, kind: AssetKind) -> Result<bool, StoreError>;

    /// Deleting a missing entry is not an error.
    async fn delete(&self, voice_id: &str, kind: AssetKind) -> Result<(), StoreError>;

    /// Backend identifier for logging.
    fn backend_type(&self) -> &str;
}

/// In-memory store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryByteStore {
    entries: RwLock<HashMap<(String, AssetKind), Bytes>>,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop everything, as storage eviction would.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl ByteStore for MemoryByteStore {
    async fn get(&self, voice_id: &str, kind: AssetKind) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.read().get(&(voice_id.to_string(), kind)).cloned())
    }

    async fn put(&self, voice_id: &str, kind: AssetKind, bytes: Bytes) -> Result<(), StoreError> {
        self.entries.write().insert((voice_id.to_string(), kind), bytes);
        Ok(())
    }

    async fn exists(&self, voice_id: &str, kind: AssetKind) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .read()
            .get(&(voice_id.to_string(), kind))
            .is_some_and(|bytes| !bytes.is_empty()))
    }

    async fn delete(&self, voice_id: &str, kind: AssetKind) -> Result<(), StoreError> {
        self.entries.write().remove(&(voice_id.to_string(), kind));
        Ok(())
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}

/// Filesystem store laid out as `<root>/<voice_id>/<kind>.bin`.
pub struct FilesystemByteStore {
    root: PathBuf,
}

impl FilesystemByteStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn entry_path(&self, voice_id: &str, kind: AssetKind) -> PathBuf {
        self.root
            .join(sanitize_component(voice_id))
            .join(format!("{}.bin", kind.as_str()))
    }
}

/// Keep voice ids from escaping the store root.
fn sanitize_component(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("_{cleaned}")
    } else {
        cleaned
    }
}

#[async_trait]
impl ByteStore for FilesystemByteStore {
    async fn get(&self, voice_id: &str, kind: AssetKind) -> Result<Option<Bytes>, StoreError> {
        match fs::read(self.entry_path(voice_id, kind)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, voice_id: &str, kind: AssetKind, bytes: Bytes) -> Result<(), StoreError> {
        let path = self.entry_path(voice_id, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Atomic write using temp file
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;
        log::debug!(
            "Stored {} for {} ({} bytes) at {}",
            kind,
            voice_id,
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    async fn exists(&self, voice_id: &str, kind: AssetKind) -> Result<bool, StoreError> {
        match fs::metadata(self.entry_path(voice_id, kind)).await {
            Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, voice_id: &str, kind: AssetKind) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(voice_id, kind)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }
}
