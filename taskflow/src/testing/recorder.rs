//! Notification recorder.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::signal::{Observable, Subscription};

/// Records every value delivered by the observables it is attached to.
///
/// Clones share the same log.
#[derive(Debug)]
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Starts recording `source` until the returned subscription is dropped.
    pub fn attach<O>(&self, source: &O) -> Subscription
    where
        O: Observable<T> + ?Sized,
    {
        let values = Arc::clone(&self.values);
        source.observe(Box::new(move |value: &T| values.lock().push(value.clone())))
    }

    /// Returns everything recorded so far.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    /// Returns the most recent value.
    #[must_use]
    pub fn last(&self) -> Option<T> {
        self.values.lock().last().cloned()
    }

    /// Returns the number of recorded values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.values.lock().clear();
    }
}

impl<T: Clone + Send + 'static> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Subject;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_recorder_tracks_multiple_sources() {
        let a = Subject::new();
        let b = Subject::new();
        let recorder = Recorder::new();
        let _a = recorder.attach(&a);
        let _b = recorder.attach(&b);

        a.next("a");
        b.next("b");

        assert_eq!(recorder.values(), vec!["a", "b"]);
        assert_eq!(recorder.last(), Some("b"));
        assert_eq!(recorder.len(), 2);

        recorder.clear();
        assert!(recorder.is_empty());
    }
}
