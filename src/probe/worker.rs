//! Bounded probe job queue
//!
//! Feeds probe targets to the worker tasks. Two priorities: the dispatcher
//! submits due probes at the front so that freshly due work is not stuck
//! behind a backlog.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Priority {
    Front,
    Normal,
}

#[derive(Debug, thiserror::Error)]
#[error("probe job queue is full")]
pub(crate) struct QueueFull;

#[derive(Debug)]
pub(crate) struct JobQueue {
    jobs: Mutex<VecDeque<Arc<Target>>>,
    capacity: usize,
    notify: Notify,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Queue a probe job, failing when the queue is full
    pub fn submit(&self, vt: Arc<Target>, priority: Priority) -> Result<(), QueueFull> {
        {
            let mut jobs = self.jobs.lock();
            if jobs.len() >= self.capacity {
                return Err(QueueFull);
            }
            match priority {
                Priority::Front => jobs.push_front(vt),
                Priority::Normal => jobs.push_back(vt),
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Next job, waiting if the queue is empty; `None` once cancelled
    pub async fn next(&self, cancel: &CancellationToken) -> Option<Arc<Target>> {
        loop {
            if let Some(vt) = self.jobs.lock().pop_front() {
                return Some(vt);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }
}
