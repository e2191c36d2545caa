//! Cache-aside image downloading.
//!
//! An [`ImageLoader`] serves photos from an on-disk [`CacheStore`] and falls
//! back to the network on a miss, writing successful downloads back to disk.
//!
//! ```no_run
//! use photo_loader::api::logging::init_tracing;
//! use photo_loader::{CacheKey, DownloadRequest, ImageLoader, LoaderConfig, ResourceClass};
//!
//! # async fn run() -> anyhow::Result<()> {
//! init_tracing();
//! let loader = ImageLoader::from_config(&LoaderConfig::default())?;
//! let request = DownloadRequest::get(&photo_loader::catalog::thumbnail_url(42))?;
//! let key = CacheKey::for_class(ResourceClass::Thumbnail, "42.jpg");
//!
//! let handle = loader.download_with_cache(request, key);
//! handle
//!     .deliver(Some(|f: f32| println!("{:.0}%", f * 100.0)), |done| {
//!         println!("hit={} ok={}", done.is_cache_hit(), done.is_success());
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod favourites;
pub mod source;

pub use config::LoaderConfig;
pub use engine::cache::{CacheKey, CacheStore, ResourceClass};
pub use engine::cancel::Canceller;
pub use engine::downloader::{Completion, DownloadEvent, DownloadHandle, ImageLoader};
pub use error::{CacheError, LoaderError, TransferError};
pub use source::traits::{DownloadRequest, ResponseEnvelope, Transport};
