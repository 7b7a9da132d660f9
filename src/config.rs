//! Runtime configuration.
//!
//! Every policy constant here (chunk budgets, download milestones) is a
//! product-tuning choice, so all of them can be overridden from a JSON file or
//! through [`TtsConfigBuilder`].

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::text::{is_cjk_dominant, DEFAULT_MAX_CHARS};

/// Public Piper voice repository; catalog file paths are relative to it.
pub const DEFAULT_VOICES_BASE_URL: &str =
    "https://huggingface.co/rhasspy/piper-voices/resolve/main";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL that catalog file paths are resolved against
    pub voices_base_url: String,
    /// Root directory of the filesystem byte store
    pub cache_dir: PathBuf,
    /// JSON file holding the ids of voices believed to be downloaded
    pub downloaded_list_path: PathBuf,
    pub segmentation: SegmentationConfig,
    pub download: DownloadMilestones,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voices_base_url: DEFAULT_VOICES_BASE_URL.to_string(),
            cache_dir: PathBuf::from(".piper-local/models"),
            downloaded_list_path: PathBuf::from(".piper-local/downloaded-models.json"),
            segmentation: SegmentationConfig::default(),
            download: DownloadMilestones::default(),
        }
    }
}

impl TtsConfig {
    /// Load a config file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Character budgets for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub max_chars: usize,
    /// Smaller budget for CJK-dominant text, which costs more audio per character
    pub cjk_max_chars: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            cjk_max_chars: 150,
        }
    }
}

impl SegmentationConfig {
    /// Budget to use for `text`, based on its dominant script.
    pub fn budget_for(&self, text: &str) -> usize {
        if is_cjk_dominant(text) {
            self.cjk_max_chars
        } else {
            self.max_chars
        }
    }
}

/// Percentages reported by a successful download, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadMilestones {
    /// Model asset fetched, about to be written
    pub model_fetched: u8,
    /// Model asset written
    pub model_stored: u8,
    /// Config asset written
    pub complete: u8,
}

impl Default for DownloadMilestones {
    fn default() -> Self {
        Self {
            model_fetched: 25,
            model_stored: 75,
            complete: 100,
        }
    }
}
