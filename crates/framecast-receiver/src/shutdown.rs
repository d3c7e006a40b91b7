use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<CancelHook>>,
}

/// Cooperative cancellation flag shared by every thread of a receiver.
///
/// Cancelling is one-way. Threads poll [`ShutdownToken::is_cancelled`] between
/// blocking calls; nothing is ever interrupted from the outside. Components
/// that park on a condition variable register a wake-up with
/// [`ShutdownToken::on_cancel`].
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns `true` for the call that flipped the flag.
    ///
    /// The first call runs every registered hook on the calling thread.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let hooks = std::mem::take(&mut *self.hooks());
        for hook in hooks {
            hook();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Run `hook` once when the token is cancelled, or right away if it
    /// already is.
    pub(crate) fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.hooks();
        if self.is_cancelled() {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }

    /// Sleep for `total`, waking every `step` to check the flag.
    ///
    /// Returns `false` if the token was cancelled before the time was up.
    pub fn sleep(&self, total: Duration, step: Duration) -> bool {
        let deadline = Instant::now() + total;
        let step = step.max(Duration::from_millis(1));
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(step.min(deadline - now));
        }
    }

    fn hooks(&self) -> std::sync::MutexGuard<'_, Vec<CancelHook>> {
        self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
