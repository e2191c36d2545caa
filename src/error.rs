// Error types shared by the transfer, cache and orchestration layers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the network layer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transfer failed: {0}")]
    Transport(String),

    #[error("transfer cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransferError::Timeout
        } else if e.is_connect() {
            TransferError::Connect(e.to_string())
        } else {
            TransferError::Transport(e.to_string())
        }
    }
}

/// Failure reported by the on-disk cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("not cached: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cache i/o on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error carried by a [`Completion`](crate::engine::downloader::Completion).
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("no tokio runtime to run the download on")]
    NoRuntime,
}

impl LoaderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Transfer(TransferError::Cancelled))
    }
}
