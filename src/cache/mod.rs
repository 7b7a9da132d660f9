//! Voice asset caching.
//!
//! Assets live in a pluggable [`ByteStore`]; [`DownloadedSet`] is a persisted
//! hint of which voices are believed to be there, and [`ModelCacheManager`]
//! reconciles the two while downloading, verifying and evicting voices.

pub mod downloaded;
pub mod manager;
pub mod store;

pub use downloaded::DownloadedSet;
pub use manager::{DownloadError, ModelAssets, ModelCacheManager};
pub use store::{AssetKind, ByteStore, FilesystemByteStore, MemoryByteStore, StoreError};
