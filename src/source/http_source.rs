use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use super::traits::{BodyReader, DownloadRequest, OpenedResponse, ResponseEnvelope, Transport};
use crate::config::LoaderConfig;
use crate::error::TransferError;

/// [`Transport`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client honouring the configured timeouts and user agent.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("building http client")?;
        Ok(Self { client })
    }

    fn build_request(&self, request: &DownloadRequest) -> RequestBuilder {
        let mut req = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        req
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &DownloadRequest) -> Result<OpenedResponse, TransferError> {
        let resp = match self.build_request(request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("http {} {} failed: {}", request.method, request.url, e);
                return Err(e.into());
            }
        };

        let envelope = envelope_of(&resp);
        debug!(
            "http {} {} status={} length={:?}",
            request.method, request.url, envelope.status, envelope.expected_length
        );

        Ok(OpenedResponse {
            envelope,
            body: Box::new(ReqwestBody(resp)),
        })
    }
}

fn envelope_of(resp: &Response) -> ResponseEnvelope {
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect::<HashMap<_, _>>();

    let expected_length = resp.content_length().or_else(|| {
        headers
            .get("content-length")
            .and_then(|v| v.parse::<u64>().ok())
    });

    ResponseEnvelope {
        status: resp.status().as_u16(),
        headers,
        expected_length,
    }
}

struct ReqwestBody(Response);

#[async_trait]
impl BodyReader for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        self.0.chunk().await.map_err(TransferError::from)
    }
}
