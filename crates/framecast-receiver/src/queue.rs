//! Deferred work handed from network threads to the single consumer thread.
//!
//! [`channel`] returns a producer/consumer pair, the same shape as
//! `std::sync::mpsc::channel`:
//! - [`ActionQueue`] is cheap to clone and may be used from any thread; it
//!   only appends.
//! - [`ConsumerLoop`] cannot be cloned. It owns the consumer context `C` and
//!   is the only place where queued actions run, so `C` is only ever touched
//!   by the thread that drives the loop.
//!
//! Actions run in strict FIFO order. A drain takes the current batch out of
//! the queue before running it; anything enqueued while the batch runs waits
//! for the next drain. An action that fails or panics is logged and counted,
//! and the rest of the batch still runs. Once the queue's [`ShutdownToken`]
//! is cancelled, enqueue is rejected and pending actions are discarded
//! unexecuted.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{ConsumerError, QueueError};
use crate::shutdown::ShutdownToken;

/// A unit of work for the consumer thread.
pub type Action<C> = Box<dyn FnOnce(&mut C) -> Result<(), ConsumerError> + Send + 'static>;

/// Configuration for an action queue.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Maximum number of pending actions. `None` (default) is unbounded.
    pub capacity: Option<usize>,
}

/// Outcome of one or more drain passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions that ran and returned `Ok`.
    pub executed: usize,
    /// Actions that returned an error or panicked.
    pub failed: usize,
    /// Actions dropped without running because shutdown had begun.
    pub discarded: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.executed == 0 && self.failed == 0 && self.discarded == 0
    }

    pub fn merge(&mut self, other: DrainReport) {
        self.executed += other.executed;
        self.failed += other.failed;
        self.discarded += other.discarded;
    }
}

struct Shared<C> {
    actions: Mutex<VecDeque<Action<C>>>,
    ready: Condvar,
    capacity: Option<usize>,
    shutdown: ShutdownToken,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Action<C>>> {
        // Actions never run under this lock, so a poisoned guard still holds
        // a consistent queue.
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a queue with default configuration around a consumer context.
pub fn channel<C: 'static>(context: C) -> (ActionQueue<C>, ConsumerLoop<C>) {
    channel_with_config(context, QueueConfig::default())
}

/// Create a queue with explicit configuration around a consumer context.
pub fn channel_with_config<C: 'static>(
    context: C,
    config: QueueConfig,
) -> (ActionQueue<C>, ConsumerLoop<C>) {
    let shared = Arc::new(Shared {
        actions: Mutex::new(VecDeque::new()),
        ready: Condvar::new(),
        capacity: config.capacity,
        shutdown: ShutdownToken::new(),
    });

    // Wake a parked consumer no matter which handle cancels the token.
    let waker = Arc::downgrade(&shared);
    shared.shutdown.on_cancel(move || {
        if let Some(shared) = waker.upgrade() {
            let _actions = shared.lock();
            shared.ready.notify_all();
        }
    });
    (
        ActionQueue {
            shared: Arc::clone(&shared),
        },
        ConsumerLoop { shared, context },
    )
}

/// Producer handle: appends actions for the consumer thread.
pub struct ActionQueue<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for ActionQueue<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> ActionQueue<C> {
    /// Append an action. Never runs it and never waits for the consumer.
    pub fn enqueue<F>(&self, action: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut C) -> Result<(), ConsumerError> + Send + 'static,
    {
        let mut actions = self.shared.lock();
        // Checked under the lock so nothing slips in after the consumer's
        // final discard.
        if self.shared.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        if let Some(capacity) = self.shared.capacity {
            if actions.len() >= capacity {
                return Err(QueueError::Full { capacity });
            }
        }
        actions.push_back(Box::new(action));
        drop(actions);

        self.shared.ready.notify_one();
        Ok(())
    }

    /// Begin shutdown: reject new actions and wake the consumer.
    ///
    /// Same as cancelling [`ActionQueue::shutdown_token`].
    pub fn close(&self) {
        if self.shared.shutdown.cancel() {
            debug!("action queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Number of actions waiting for the next drain.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The token whose cancellation closes this queue.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shared.shutdown.clone()
    }
}

impl<C> std::fmt::Debug for ActionQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The single consumer: owns the context and runs queued actions on it.
pub struct ConsumerLoop<C> {
    shared: Arc<Shared<C>>,
    context: C,
}

impl<C> ConsumerLoop<C> {
    /// Run every action queued so far, in FIFO order.
    ///
    /// Does nothing on an empty queue. After shutdown the pending actions are
    /// discarded instead of run.
    pub fn drain_all(&mut self) -> DrainReport {
        let batch = std::mem::take(&mut *self.shared.lock());
        let mut report = DrainReport::default();

        for action in batch {
            if self.shared.shutdown.is_cancelled() {
                report.discarded += 1;
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| action(&mut self.context))) {
                Ok(Ok(())) => report.executed += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    error!(error = %err, "queued action failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(panic = panic_message(panic.as_ref()), "queued action panicked");
                }
            }
        }

        if report.discarded > 0 {
            debug!(discarded = report.discarded, "discarded actions after shutdown");
        }
        report
    }

    /// Wait up to `timeout` for work, then drain.
    pub fn wait_and_drain(&mut self, timeout: Duration) -> DrainReport {
        {
            let actions = self.shared.lock();
            if actions.is_empty() && !self.shared.shutdown.is_cancelled() {
                let shutdown = &self.shared.shutdown;
                let waited = self
                    .shared
                    .ready
                    .wait_timeout_while(actions, timeout, |actions| {
                        actions.is_empty() && !shutdown.is_cancelled()
                    });
                if let Err(poisoned) = waited {
                    warn!("action queue lock poisoned while waiting");
                    drop(poisoned.into_inner());
                }
            }
        }
        self.drain_all()
    }

    /// Drain repeatedly until shutdown, waiting at most `tick` between passes.
    ///
    /// Returns the accumulated report.
    pub fn run(&mut self, tick: Duration) -> DrainReport {
        let mut total = DrainReport::default();
        while !self.shared.shutdown.is_cancelled() {
            total.merge(self.wait_and_drain(tick));
        }
        total.merge(self.drain_all());
        total
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    /// The token whose cancellation closes this queue.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shared.shutdown.clone()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
