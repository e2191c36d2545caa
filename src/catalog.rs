// Photo list helper: fetches the service's JSON list and the per-photo image URLs.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{PHOTO_SERVICE_BASE, THUMBNAIL_EDGE};
use crate::engine::downloader::ImageLoader;
use crate::error::{LoaderError, TransferError};
use crate::source::traits::DownloadRequest;

pub type JsonObject = Map<String, Value>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("photo list unreachable: {0}")]
    Unreachable(String),

    #[error("photo list is not valid json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("photo list is not an array of objects")]
    WrongFormat,

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// URL of the photo list.
pub fn list_url() -> String {
    format!("{PHOTO_SERVICE_BASE}/list")
}

/// Square thumbnail of photo `id`.
pub fn thumbnail_url(id: u64) -> String {
    original_url(id, THUMBNAIL_EDGE, THUMBNAIL_EDGE)
}

/// Photo `id` at `width`×`height`.
pub fn original_url(id: u64, width: u32, height: u32) -> String {
    format!("{PHOTO_SERVICE_BASE}/{width}/{height}?image={id}")
}

/// Parse a JSON document whose top level is an array of objects.
pub fn load_json_array(data: &[u8]) -> Result<Vec<JsonObject>, CatalogError> {
    let value: Value = serde_json::from_slice(data)?;
    let Value::Array(items) = value else {
        return Err(CatalogError::WrongFormat);
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(obj) => Ok(obj),
            _ => Err(CatalogError::WrongFormat),
        })
        .collect()
}

/// Download the list at `url` (never cached) and parse it.
pub async fn fetch_catalog(loader: &ImageLoader, url: &str) -> Result<Vec<JsonObject>, CatalogError> {
    let request = DownloadRequest::get(url)?;
    let completion = loader
        .download(request)
        .wait()
        .await
        .ok_or_else(|| CatalogError::Unreachable("download cancelled".into()))?;

    if let Some(error) = completion.error {
        warn!("photo list {} failed: {}", url, error);
        return Err(match error {
            LoaderError::Transfer(e) => CatalogError::Transfer(e),
            other => CatalogError::Unreachable(other.to_string()),
        });
    }

    let status = completion.response.as_ref().map(|r| r.status).unwrap_or(0);
    if status != 200 {
        return Err(CatalogError::Unreachable(format!("HTTP {status}")));
    }

    let body = completion.body.unwrap_or_default();
    let list = load_json_array(&body)?;
    debug!("photo list {} has {} entries", url, list.len());
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        assert_eq!(thumbnail_url(42), "https://unsplash.it/100/100?image=42");
        assert_eq!(original_url(7, 640, 480), "https://unsplash.it/640/480?image=7");
        assert_eq!(list_url(), "https://unsplash.it/list");
    }

    #[test]
    fn test_load_array_of_objects() {
        let data = br#"[{"id": 0, "filename": "0000.jpeg"}, {"id": 1}]"#;
        let list = load_json_array(data).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["filename"], "0000.jpeg");
    }

    #[test]
    fn test_rejects_non_array() {
        assert!(matches!(
            load_json_array(br#"{"id": 0}"#),
            Err(CatalogError::WrongFormat)
        ));
        assert!(matches!(
            load_json_array(br#"[1, 2]"#),
            Err(CatalogError::WrongFormat)
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            load_json_array(b"<html>"),
            Err(CatalogError::Parse(_))
        ));
    }
}
