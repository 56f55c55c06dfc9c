//! Scripted operation for exercising retry paths.

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::task::Operation;

/// An operation that replays a fixed script of outcomes.
///
/// Each call consumes the next entry; once the script runs out the last entry
/// repeats. Call instants are recorded on the tokio clock, so they are exact
/// under a paused test runtime.
#[derive(Debug)]
pub struct ScriptedOperation<R> {
    script: Vec<Result<R, String>>,
    latency: Duration,
    calls: Mutex<Vec<Instant>>,
}

impl<R: Clone + Send + Sync + 'static> ScriptedOperation<R> {
    /// Creates an operation replaying `script`.
    #[must_use]
    pub fn new(script: Vec<Result<R, String>>) -> Self {
        Self {
            script,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails `failures` times, then succeeds with `value` forever.
    #[must_use]
    pub fn failing_times(failures: usize, value: R) -> Self {
        let mut script: Vec<Result<R, String>> = (1..=failures)
            .map(|n| Err(format!("failure {n}")))
            .collect();
        script.push(Ok(value));
        Self::new(script)
    }

    /// Fails on every call.
    #[must_use]
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::new(vec![Err(message.into())])
    }

    /// Makes every call take `latency` before resolving.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the instant of every call.
    #[must_use]
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    /// Returns the time between consecutive calls.
    #[must_use]
    pub fn gaps(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    fn outcome(&self, index: usize) -> Result<R, String> {
        match self.script.get(index).or_else(|| self.script.last()) {
            Some(outcome) => outcome.clone(),
            None => Err("empty script".to_string()),
        }
    }
}

#[async_trait]
impl<P, R> Operation<P> for ScriptedOperation<R>
where
    P: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    type Output = R;
    type Error = anyhow::Error;

    async fn call(&self, _params: P) -> Result<R, anyhow::Error> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            calls.len() - 1
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.outcome(index).map_err(|message| anyhow!(message))
    }
}
