//! Bounded background task pool
//!
//! ```text
//! caller ──try_send──► [bounded queue] ──► worker 1..n ──► TaskHandle
//!          (full → Rejected)
//! ```
//!
//! Submission never blocks: a full queue rejects the task and the caller
//! decides how to degrade. Shard audits treat a rejection as "not checked".

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::{GraphError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct TaskExecutor {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskExecutor {
    pub fn new(name: &str, threads: usize, queue_size: usize) -> Result<Self> {
        let (sender, receiver) = bounded::<Job>(queue_size);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let receiver: Receiver<Job> = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("background task panicked");
                        }
                    }
                })?;
            workers.push(worker);
        }
        Ok(Self { name: name.to_string(), sender: Some(sender), workers })
    }

    /// Queues `task`. Fails with `GraphError::Rejected` when the queue is full.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| GraphError::Rejected(format!("{} is shut down", self.name)))?;
        let (result_tx, result_rx) = bounded::<T>(1);
        let job: Job = Box::new(move || {
            let _ = result_tx.send(task());
        });
        match sender.try_send(job) {
            Ok(()) => Ok(TaskHandle::pending(result_rx)),
            Err(TrySendError::Full(_)) => Err(GraphError::Rejected(format!("{} queue is full", self.name))),
            Err(TrySendError::Disconnected(_)) => Err(GraphError::Rejected(format!("{} is shut down", self.name))),
        }
    }

    pub fn queued(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.sender.take();
        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            // a task may hold the last reference to its own pool
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}

enum HandleState<T> {
    Ready(T),
    Pending(Receiver<T>),
}

/// Result of a background task, or one known up front.
pub struct TaskHandle<T> {
    state: HandleState<T>,
}

impl<T> TaskHandle<T> {
    pub fn ready(value: T) -> Self {
        Self { state: HandleState::Ready(value) }
    }

    fn pending(receiver: Receiver<T>) -> Self {
        Self { state: HandleState::Pending(receiver) }
    }

    pub fn is_ready(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Pending(rx) => !rx.is_empty(),
        }
    }

    /// Blocks until the task finishes.
    pub fn wait(self) -> Result<T> {
        match self.state {
            HandleState::Ready(value) => Ok(value),
            HandleState::Pending(rx) => rx
                .recv()
                .map_err(|_| GraphError::Invariant("background task dropped its result".into())),
        }
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<T>> {
        match self.state {
            HandleState::Ready(value) => Ok(Some(value)),
            HandleState::Pending(rx) => match rx.recv_timeout(timeout) {
                Ok(value) => Ok(Some(value)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(GraphError::Invariant("background task dropped its result".into()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_submit_and_wait() {
        let executor = TaskExecutor::new("test-pool", 2, 4).unwrap();
        let handle = executor.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn test_full_queue_rejects() {
        let executor = TaskExecutor::new("test-pool", 1, 1).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        let blocker = executor
            .submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        started_rx.recv().unwrap();

        let queued = executor.submit(|| ()).unwrap();
        let err = executor.submit(|| ()).err().unwrap();
        assert_eq!(err.code(), "REJECTED");

        release_tx.send(()).unwrap();
        blocker.wait().unwrap();
        queued.wait().unwrap();
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let executor = TaskExecutor::new("test-pool", 1, 4).unwrap();
        let failed = executor.submit(|| -> u32 { panic!("boom") }).unwrap();
        assert!(failed.wait().is_err());

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        executor.submit(move || c.fetch_add(1, Ordering::SeqCst)).unwrap().wait().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_handle() {
        let handle = TaskHandle::ready("done");
        assert!(handle.is_ready());
        assert_eq!(handle.wait_timeout(Duration::from_millis(1)).unwrap(), Some("done"));
    }
}
