use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cross-thread stop request for one output pump.
///
/// Cloned into the worker; the controller signals it from the caller thread.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    requested: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop. Returns `true` only for the first call.
    pub fn signal(&self) -> bool {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Taking the lock orders this notify after any waiter's flag check.
        let _guard = self.inner.lock.lock();
        self.inner.cond.notify_all();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, waking early on stop.
    ///
    /// Returns whether stop has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_requested() {
            return true;
        }
        self.inner.cond.wait_for(&mut guard, timeout);
        self.is_requested()
    }
}
