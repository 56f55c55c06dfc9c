//! Per-generation cancellation token.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// A callback run once when the token is cancelled.
pub type CancelCallback = Box<dyn FnOnce() + Send + Sync>;

/// Cooperative cancellation flag owned by one generation of a task.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
pub struct GenerationToken {
    generation: u64,
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: Mutex<Vec<CancelCallback>>,
}

impl GenerationToken {
    /// Creates a live token for `generation`.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: AtomicBool::new(false),
            reason: RwLock::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Returns the generation this token belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks are invoked immediately. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());

            let callbacks = std::mem::take(&mut *self.callbacks.lock());
            for callback in callbacks {
                run_callback(self.generation, callback);
            }
        }
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock();
        if self.is_cancelled() {
            drop(callbacks);
            run_callback(self.generation, Box::new(callback));
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

fn run_callback(generation: u64, callback: CancelCallback) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        warn!(generation, "Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for GenerationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationToken")
            .field("generation", &self.generation)
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
