//! Cancellable delayed jobs.
//!
//! Each [`Debouncer::schedule`] call aborts the job still waiting from the
//! previous call, so a burst of requests runs the work once. Results come back
//! over a channel tagged with the generation that scheduled them; anything
//! from an older generation is dropped on receipt.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::trace;

pub struct Debouncer<T> {
    delay: Duration,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    sender: UnboundedSender<(u64, T)>,
    receiver: UnboundedReceiver<(u64, T)>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            delay,
            generation: 0,
            pending: None,
            sender,
            receiver,
        }
    }

    /// Whether a scheduled job has not delivered its result yet
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run `job` after the delay unless another job is scheduled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, job: F)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation += 1;
        let generation = self.generation;
        let sender = self.sender.clone();
        let delay = self.delay;
        trace!(generation, "scheduling debounced job");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send((generation, job()));
        }));
    }

    /// Abort the pending job and invalidate any result already in flight
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    /// The latest delivered result of the current generation, without waiting
    pub fn poll(&mut self) -> Option<T> {
        let mut latest = None;
        while let Ok((generation, value)) = self.receiver.try_recv() {
            if generation == self.generation {
                latest = Some(value);
            }
        }
        if latest.is_some() {
            self.pending = None;
        }
        latest
    }

    /// Wait for the current job's result. Returns `None` when nothing is
    /// scheduled.
    pub async fn next(&mut self) -> Option<T> {
        if let Some(value) = self.poll() {
            return Some(value);
        }
        self.pending.as_ref()?;
        while let Some((generation, value)) = self.receiver.recv().await {
            if generation == self.generation {
                self.pending = None;
                return Some(value);
            }
        }
        None
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
