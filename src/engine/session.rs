// One network transfer: streams the body, reports progress, completes once.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransferError;
use crate::source::traits::{DownloadRequest, ResponseEnvelope, Transport};

/// Result of a finished transfer. `body` holds whatever arrived, even on error.
#[derive(Debug)]
pub struct TransferOutcome {
    pub body: Bytes,
    pub response: Option<ResponseEnvelope>,
    pub error: Option<TransferError>,
}

impl TransferOutcome {
    /// No transport error and status exactly 200.
    pub fn is_ok_200(&self) -> bool {
        self.error.is_none() && self.response.as_ref().is_some_and(|r| r.status == 200)
    }
}

/// Per-transfer state. A session runs exactly once and owns its buffer.
pub struct TransferSession {
    transport: Arc<dyn Transport>,
    expected_length: u64,
    buffer: BytesMut,
    response: Option<ResponseEnvelope>,
}

impl TransferSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            expected_length: 0,
            buffer: BytesMut::new(),
            response: None,
        }
    }

    /// Perform the transfer. `on_progress` is called after every chunk while
    /// the expected length is known; it never runs after this returns.
    pub async fn run<F>(
        mut self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> TransferOutcome
    where
        F: FnMut(f32) + Send,
    {
        let transport = Arc::clone(&self.transport);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("transfer {} cancelled before response", request.url);
                return self.finish(Some(TransferError::Cancelled));
            }
            opened = transport.open(request) => opened,
        };

        let mut body = match opened {
            Ok(opened) => {
                self.expected_length = opened.envelope.expected_length.unwrap_or(0);
                self.response = Some(opened.envelope);
                opened.body
            }
            Err(e) => return self.finish(Some(e)),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(
                        "transfer {} cancelled after {} bytes",
                        request.url,
                        self.buffer.len()
                    );
                    return self.finish(Some(TransferError::Cancelled));
                }
                next = body.next_chunk() => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    self.buffer.extend_from_slice(&chunk);
                    if let Some(fraction) = self.fraction() {
                        on_progress(fraction);
                    }
                }
                Ok(None) => return self.finish(None),
                Err(e) => {
                    debug!("transfer {} failed: {}", request.url, e);
                    return self.finish(Some(e));
                }
            }
        }
    }

    /// `received / expected`, or `None` when the expected length is unknown.
    fn fraction(&self) -> Option<f32> {
        if self.expected_length == 0 {
            return None;
        }
        let ratio = self.buffer.len() as f64 / self.expected_length as f64;
        Some(ratio.min(1.0) as f32)
    }

    fn finish(self, error: Option<TransferError>) -> TransferOutcome {
        TransferOutcome {
            body: self.buffer.freeze(),
            response: self.response,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;

    use super::*;
    use crate::source::traits::{BodyReader, OpenedResponse};

    struct Chunks(VecDeque<Result<Bytes, TransferError>>);

    #[async_trait]
    impl BodyReader for Chunks {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
            match self.0.pop_front() {
                Some(Ok(b)) => Ok(Some(b)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    /// Serves a fixed chunk list; `fail_at` swaps that chunk for a reset error.
    struct ChunkedTransport {
        chunks: Vec<&'static [u8]>,
        expected: Option<u64>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl Transport for ChunkedTransport {
        async fn open(&self, _request: &DownloadRequest) -> Result<OpenedResponse, TransferError> {
            let chunks = self
                .chunks
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    if Some(i) == self.fail_at {
                        Err(TransferError::Transport("connection reset".into()))
                    } else {
                        Ok(Bytes::from_static(*c))
                    }
                })
                .collect();
            Ok(OpenedResponse {
                envelope: ResponseEnvelope {
                    status: 200,
                    headers: HashMap::new(),
                    expected_length: self.expected,
                },
                body: Box::new(Chunks(chunks)),
            })
        }
    }

    fn request() -> DownloadRequest {
        DownloadRequest::get("http://example.invalid/42").unwrap()
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_bounded() {
        let transport = Arc::new(ChunkedTransport {
            chunks: vec![&b"aa"[..], &b"bb"[..], &b"cccc"[..]],
            expected: Some(8),
            fail_at: None,
        });
        let mut seen = Vec::new();
        let outcome = TransferSession::new(transport)
            .run(&request(), &CancellationToken::new(), |f| seen.push(f))
            .await;

        assert_eq!(seen, vec![0.25, 0.5, 1.0]);
        assert_eq!(&outcome.body[..], b"aabbcccc");
        assert!(outcome.is_ok_200());
    }

    #[tokio::test]
    async fn test_unknown_length_skips_progress() {
        let transport = Arc::new(ChunkedTransport {
            chunks: vec![&b"abc"[..], &b"def"[..]],
            expected: None,
            fail_at: None,
        });
        let mut calls = 0;
        let outcome = TransferSession::new(transport)
            .run(&request(), &CancellationToken::new(), |_| calls += 1)
            .await;

        assert_eq!(calls, 0);
        assert_eq!(&outcome.body[..], b"abcdef");
    }

    #[tokio::test]
    async fn test_transport_error_keeps_partial_body() {
        let transport = Arc::new(ChunkedTransport {
            chunks: vec![&b"abc"[..], &b"def"[..], &b"ghi"[..]],
            expected: Some(9),
            fail_at: Some(1),
        });
        let outcome = TransferSession::new(transport)
            .run(&request(), &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(&outcome.body[..], b"abc");
        assert!(matches!(outcome.error, Some(TransferError::Transport(_))));
        assert!(!outcome.is_ok_200());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let transport = Arc::new(ChunkedTransport {
            chunks: vec![&b"abc"[..]],
            expected: Some(3),
            fail_at: None,
        });
        let token = CancellationToken::new();
        token.cancel();
        let outcome = TransferSession::new(transport)
            .run(&request(), &token, |_| panic!("no progress after cancel"))
            .await;

        assert!(outcome.body.is_empty());
        assert!(outcome.response.is_none());
        assert!(matches!(outcome.error, Some(TransferError::Cancelled)));
    }

    #[tokio::test]
    async fn test_overlong_body_clamps_fraction() {
        let transport = Arc::new(ChunkedTransport {
            chunks: vec![&b"abcd"[..], &b"efgh"[..]],
            expected: Some(4),
            fail_at: None,
        });
        let mut seen = Vec::new();
        TransferSession::new(transport)
            .run(&request(), &CancellationToken::new(), |f| seen.push(f))
            .await;

        assert_eq!(seen, vec![1.0, 1.0]);
    }
}
