use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, Url};

use crate::error::TransferError;

/// Everything needed to issue one request. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl DownloadRequest {
    /// Plain GET for `url`.
    pub fn get(url: &str) -> Result<Self, TransferError> {
        let url = Url::parse(url).map_err(|e| TransferError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::from(url))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl From<Url> for DownloadRequest {
    fn from(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    /// Announced body size, if the server sent one.
    pub expected_length: Option<u64>,
}

impl ResponseEnvelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Incremental reader over a response body.
#[async_trait]
pub trait BodyReader: Send {
    /// Next chunk of the body, `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError>;
}

pub struct OpenedResponse {
    pub envelope: ResponseEnvelope,
    pub body: Box<dyn BodyReader>,
}

/// Network seam: sends a request and hands back its streaming body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &DownloadRequest) -> Result<OpenedResponse, TransferError>;
}
