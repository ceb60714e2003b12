//! One-shot, cancellable re-check timer.
//!
//! After a stale display the consumer reads the key once more after a short
//! delay, in case the producer has written since. The timer is advisory: if
//! it is cancelled, torn down, or can't be scheduled, nothing breaks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use screencache_core::CacheKey;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Delivered when a scheduled re-check comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecheckFired {
    pub key: CacheKey,
    /// Decision generation that scheduled the re-check.
    pub generation: u64,
}

/// Handle to a pending re-check. Dropping it cancels the re-check.
#[derive(Debug)]
pub struct RecheckTimer {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl RecheckTimer {
    /// Deliver `fired` on `sender` after `delay`.
    ///
    /// Returns `None` when called outside a tokio runtime.
    pub fn schedule(
        delay: Duration,
        fired: RecheckFired,
        sender: UnboundedSender<RecheckFired>,
    ) -> Option<Self> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(key = %fired.key, error = %e, "no runtime for re-check, skipping");
                return None;
            }
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::Acquire) {
                return;
            }
            debug!(key = %fired.key, generation = fired.generation, "re-check due");
            // Receiver gone means the consumer was torn down.
            let _ = sender.send(fired);
        });

        Some(Self { handle, cancelled })
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RecheckTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
