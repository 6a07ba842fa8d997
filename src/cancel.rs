//! Cooperative cancellation shared by the relay threads.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable flag that threads check at their suspension points.
///
/// Sleeping through [`CancellationToken::sleep`] wakes early once the token is
/// cancelled, so a producer waiting out its interval stops promptly.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper. Repeated calls are no-ops.
    pub fn cancel(&self) {
        let mut guard = self.inner.cancelled.lock().expect("token mutex poisoned");
        *guard = true;
        self.inner.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().expect("token mutex poisoned")
    }

    /// Sleep for `duration` unless cancelled first; returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.cancelled.lock().expect("token mutex poisoned");
        loop {
            if *guard {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .inner
                .changed
                .wait_timeout(guard, deadline - now)
                .expect("condvar wait failed")
                .0;
        }
    }
}
