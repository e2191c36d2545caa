use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Cancellation for one download call.
///
/// `cancel` only stops the transfer; whatever completion it produces is still
/// delivered. `cancel_ignoring_completion` additionally silences the call so
/// that nothing further reaches the caller.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    stop: CancellationToken,
    silenced: Arc<AtomicBool>,
}

impl Canceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stop.cancel();
    }

    pub fn cancel_ignoring_completion(&self) {
        // Silence before stopping so a completion racing the stop is dropped.
        self.silenced.store(true, Ordering::SeqCst);
        self.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn is_silenced(&self) -> bool {
        self.silenced.load(Ordering::SeqCst)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.stop
    }
}
