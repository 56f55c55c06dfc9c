//! Ordered delivery queue shared by the subjects of one owner.
//!
//! Owners stage notifications while holding the queue lock, then call
//! [`Dispatcher::drain`] after releasing their own locks. Exactly one thread
//! drains at a time and listeners run with no lock held. A value staged from
//! inside a listener, or from another thread while a drain is running, is
//! delivered by the active drainer once the current job returns.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// A staged delivery.
pub(crate) type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    draining: bool,
}

#[derive(Default)]
pub(crate) struct Dispatcher {
    queue: Mutex<Queue>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `stage` with the queue locked. Jobs it pushes are delivered in
    /// push order, after every job staged before them.
    ///
    /// `stage` must not call back into user code.
    pub(crate) fn stage<R>(&self, stage: impl FnOnce(&mut VecDeque<Job>) -> R) -> R {
        let mut queue = self.queue.lock();
        stage(&mut queue.jobs)
    }

    /// Delivers staged jobs until the queue is empty, unless another drain is
    /// already running.
    pub(crate) fn drain(&self) {
        {
            let mut queue = self.queue.lock();
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let job = {
                let mut queue = self.queue.lock();
                match queue.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            job();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        let queue = self.queue.lock();
        !queue.draining && queue.jobs.is_empty()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("Dispatcher")
            .field("staged", &queue.jobs.len())
            .field("draining", &queue.draining)
            .finish()
    }
}
