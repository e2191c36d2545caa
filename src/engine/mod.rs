// Engine: cache store, transfer sessions and the cache-aside loader.

pub mod cache;
pub mod cancel;
pub mod downloader;
pub mod session;
pub mod stats;
