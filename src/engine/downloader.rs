// Cache-aside image loader: serves from disk when possible, otherwise downloads and populates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::cache::{CacheKey, CacheStore};
use super::cancel::Canceller;
use super::session::{TransferOutcome, TransferSession};
use super::stats::{StatsCollector, StatsSnapshot};
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::source::http_source::HttpTransport;
use crate::source::traits::{DownloadRequest, ResponseEnvelope, Transport};

/// Final result of one download call.
///
/// A cache hit has a body and neither response nor error. A transfer always
/// carries the bytes it received, even when `error` is set.
#[derive(Debug)]
pub struct Completion {
    pub body: Option<Bytes>,
    pub response: Option<ResponseEnvelope>,
    pub error: Option<LoaderError>,
}

impl Completion {
    fn cached(body: Bytes) -> Self {
        Self {
            body: Some(body),
            response: None,
            error: None,
        }
    }

    fn failed(error: LoaderError) -> Self {
        Self {
            body: None,
            response: None,
            error: Some(error),
        }
    }

    fn from_transfer(outcome: TransferOutcome) -> Self {
        Self {
            body: Some(outcome.body),
            response: outcome.response,
            error: outcome.error.map(LoaderError::from),
        }
    }

    /// Served from the cache store without touching the network.
    pub fn is_cache_hit(&self) -> bool {
        self.error.is_none() && self.response.is_none() && self.body.is_some()
    }

    /// Usable bytes: a cache hit, or a transfer without error and status 200.
    pub fn is_success(&self) -> bool {
        self.is_cache_hit()
            || (self.error.is_none() && self.response.as_ref().is_some_and(|r| r.status == 200))
    }
}

#[derive(Debug)]
pub enum DownloadEvent {
    Progress(f32),
    Completed(Completion),
}

type Registry = Arc<Mutex<HashMap<u64, Canceller>>>;

/// Keeps a call reachable from loader-wide cancellation until its handle
/// has handed out the completion or has been dropped.
struct Registration {
    id: u64,
    registry: Registry,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

/// Caller's end of one download call.
///
/// Yields progress events in order, then at most one completion. Events are
/// consumed on whichever task awaits the handle, so callbacks passed to
/// [`deliver`](Self::deliver) never run concurrently with each other.
pub struct DownloadHandle {
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    canceller: Canceller,
    finished: bool,
    registration: Option<Registration>,
}

impl DownloadHandle {
    fn new(
        events: mpsc::UnboundedReceiver<DownloadEvent>,
        canceller: Canceller,
        registration: Option<Registration>,
    ) -> Self {
        Self {
            events,
            canceller,
            finished: false,
            registration,
        }
    }

    /// A handle whose completion is already decided and never touches a runtime.
    fn settled(completion: Completion) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(DownloadEvent::Completed(completion));
        Self::new(rx, Canceller::new(), None)
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Stop the transfer; a completion that still arrives is delivered.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Stop the transfer and drop anything it would still deliver.
    pub fn cancel_ignoring_completion(&self) {
        self.canceller.cancel_ignoring_completion();
    }

    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        if self.finished || self.canceller.is_silenced() {
            return None;
        }

        let event = self.events.recv().await;

        // The flag may have flipped while we were parked on the channel.
        if self.canceller.is_silenced() {
            self.finish();
            return None;
        }
        if !matches!(event, Some(DownloadEvent::Progress(_))) {
            self.finish();
        }
        event
    }

    fn finish(&mut self) {
        self.finished = true;
        self.registration = None;
    }

    /// Skip progress and return the completion, if one is delivered.
    pub async fn wait(mut self) -> Option<Completion> {
        while let Some(event) = self.next_event().await {
            if let DownloadEvent::Completed(completion) = event {
                return Some(completion);
            }
        }
        None
    }

    /// Run the callbacks on the current task: progress in order, then the
    /// completion at most once.
    pub async fn deliver<P, C>(mut self, mut on_progress: Option<P>, on_complete: C)
    where
        P: FnMut(f32),
        C: FnOnce(Completion),
    {
        while let Some(event) = self.next_event().await {
            match event {
                DownloadEvent::Progress(fraction) => {
                    if let Some(on_progress) = on_progress.as_mut() {
                        on_progress(fraction);
                    }
                }
                DownloadEvent::Completed(completion) => {
                    on_complete(completion);
                    return;
                }
            }
        }
    }
}

struct LoaderInner {
    store: CacheStore,
    transport: Arc<dyn Transport>,
    stats: StatsCollector,
    validate_images: bool,
    in_flight: Registry,
    next_id: AtomicU64,
    runtime: Option<Handle>,
}

/// Cache-aside downloader.
///
/// Every call runs as its own task with its own transfer state, so calls on
/// one loader never share buffers or handlers. Cloning is cheap and clones
/// share the store, transport, stats and in-flight registry.
///
/// Calls are spawned on the tokio runtime of the calling context. Outside
/// any runtime they fall back to the runtime the loader was built on; a
/// loader built and used with no runtime at all completes every call with
/// [`LoaderError::NoRuntime`].
#[derive(Clone)]
pub struct ImageLoader {
    inner: Arc<LoaderInner>,
}

impl ImageLoader {
    pub fn new(store: CacheStore, transport: Arc<dyn Transport>) -> Self {
        Self::build(store, transport, true)
    }

    /// Loader over a custom transport, cache root and validation from `config`.
    pub fn with_config(config: &LoaderConfig, transport: Arc<dyn Transport>) -> Self {
        Self::build(
            CacheStore::new(config.cache_root.clone()),
            transport,
            config.validate_images,
        )
    }

    /// Loader over HTTP, configured from `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(config)?);
        info!(
            "image loader cache_root={} validate_images={}",
            config.cache_root.display(),
            config.validate_images
        );
        Ok(Self::with_config(config, transport))
    }

    fn build(store: CacheStore, transport: Arc<dyn Transport>, validate_images: bool) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                store,
                transport,
                stats: StatsCollector::new(),
                validate_images,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
                next_id: AtomicU64::new(0),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of calls whose completion has not reached the caller yet.
    /// A call leaves the count when its handle yields the completion or is dropped.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Serve `key` from the cache, or download `request` and cache the result.
    pub fn download_with_cache(&self, request: DownloadRequest, key: CacheKey) -> DownloadHandle {
        self.spawn_call(move |inner, canceller, tx| async move {
            inner.fetch_cached(&request, &key, &canceller, &tx).await
        })
    }

    /// Download `request` without consulting or populating the cache.
    pub fn download(&self, request: DownloadRequest) -> DownloadHandle {
        self.spawn_call(move |inner, canceller, tx| async move {
            Completion::from_transfer(inner.transfer(&request, &canceller, &tx).await)
        })
    }

    /// Stop every in-flight call; their completions are still delivered.
    pub fn cancel(&self) {
        for canceller in self.inner.in_flight.lock().values() {
            canceller.cancel();
        }
    }

    /// Stop every in-flight call and drop whatever they would deliver.
    pub fn cancel_ignoring_completion(&self) {
        for canceller in self.inner.in_flight.lock().values() {
            canceller.cancel_ignoring_completion();
        }
    }

    fn spawn_call<F, Fut>(&self, work: F) -> DownloadHandle
    where
        F: FnOnce(Arc<LoaderInner>, Canceller, mpsc::UnboundedSender<DownloadEvent>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = Completion> + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(current) => current,
            Err(_) => match &self.inner.runtime {
                Some(captured) => captured.clone(),
                None => {
                    warn!("download requested with no tokio runtime available");
                    return DownloadHandle::settled(Completion::failed(LoaderError::NoRuntime));
                }
            },
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let canceller = Canceller::new();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.lock().insert(id, canceller.clone());
        let registration = Registration {
            id,
            registry: Arc::clone(&self.inner.in_flight),
        };

        let inner = Arc::clone(&self.inner);
        let task_canceller = canceller.clone();
        inner.stats.call_started();
        runtime.spawn(async move {
            let completion = work(Arc::clone(&inner), task_canceller.clone(), tx.clone()).await;

            if task_canceller.is_silenced() {
                debug!("call {} silenced, dropping completion", id);
            } else {
                let _ = tx.send(DownloadEvent::Completed(completion));
            }
            inner.stats.call_finished();
        });

        DownloadHandle::new(rx, canceller, Some(registration))
    }
}

impl LoaderInner {
    async fn fetch_cached(
        &self,
        request: &DownloadRequest,
        key: &CacheKey,
        canceller: &Canceller,
        tx: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> Completion {
        if let Err(e) = self.store.path_for(key) {
            return Completion::failed(e.into());
        }
        if let Err(e) = self.store.ensure_directory(&key.subfolder).await {
            warn!("cache directory for {} unavailable: {}", key.subfolder, e);
            return Completion::failed(e.into());
        }

        if self.store.exists(key).await {
            self.stats.record_hit();
            debug!("cache hit {}/{}", key.subfolder, key.filename);
            return match self.store.read(key).await {
                Ok(body) => Completion::cached(body),
                Err(e) => {
                    warn!("cache read {}/{} failed: {}", key.subfolder, key.filename, e);
                    Completion::failed(e.into())
                }
            };
        }

        self.stats.record_miss();
        debug!("cache miss {}/{}, fetching {}", key.subfolder, key.filename, request.url);

        let outcome = self.transfer(request, canceller, tx).await;
        if outcome.is_ok_200() {
            self.populate(key, &outcome.body).await;
        } else if let Some(response) = &outcome.response {
            debug!(
                "not caching {}/{}: status={} error={:?}",
                key.subfolder, key.filename, response.status, outcome.error
            );
        }
        Completion::from_transfer(outcome)
    }

    async fn transfer(
        &self,
        request: &DownloadRequest,
        canceller: &Canceller,
        tx: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> TransferOutcome {
        self.stats.increment_transfers();
        let outcome = TransferSession::new(Arc::clone(&self.transport))
            .run(request, canceller.token(), |fraction| {
                if !canceller.is_silenced() {
                    let _ = tx.send(DownloadEvent::Progress(fraction));
                }
            })
            .await;
        self.stats.decrement_transfers();
        self.stats.record_downloaded(outcome.body.len() as u64);
        outcome
    }

    /// Best effort: a failed write is logged and counted, never surfaced.
    async fn populate(&self, key: &CacheKey, body: &Bytes) {
        if self.validate_images && !is_decodable_image(body.clone()).await {
            debug!(
                "not caching {}/{}: body is not a decodable image",
                key.subfolder, key.filename
            );
            return;
        }
        if let Err(e) = self.store.write(key, body).await {
            self.stats.record_write_failure();
            warn!("cache write {}/{} failed: {}", key.subfolder, key.filename, e);
        }
    }
}

async fn is_decodable_image(body: Bytes) -> bool {
    tokio::task::spawn_blocking(move || image::load_from_memory(&body).is_ok())
        .await
        .unwrap_or(false)
}
