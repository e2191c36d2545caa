use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Subfolder holding list-cell sized images.
pub const THUMBNAILS_SUBFOLDER: &str = "thumbnails";

/// Subfolder holding full-size images.
pub const ORIGINALS_SUBFOLDER: &str = "originals";

/// Directory created under the platform cache root.
pub const CACHE_DIR_NAME: &str = "photo-loader";

/// Base URL of the photo service.
pub const PHOTO_SERVICE_BASE: &str = "https://unsplash.it";

/// Edge length in pixels of a thumbnail request.
pub const THUMBNAIL_EDGE: u32 = 100;

/// Default per-request deadline enforced by the transport (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Log filter used when `RUST_LOG` is unset. Keeps the HTTP stack quiet.
pub const DEFAULT_LOG_FILTER: &str = "info,photo_loader=debug,hyper=warn,reqwest=warn";

/// Top-level configuration for the image loader.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root directory for cached resources.
    pub cache_root: PathBuf,
    /// Whole-request deadline. `None` disables the transport timeout.
    pub request_timeout_secs: Option<u64>,
    /// Deadline for establishing the connection.
    pub connect_timeout_secs: Option<u64>,
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Only cache bodies that decode as an image.
    pub validate_images: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout_secs: None,
            user_agent: format!("photo_loader/{}", env!("CARGO_PKG_VERSION")),
            validate_images: true,
        }
    }
}

impl LoaderConfig {
    /// Config rooted at `cache_root`, everything else default.
    pub fn with_cache_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid loader config")
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text)
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME)
}
