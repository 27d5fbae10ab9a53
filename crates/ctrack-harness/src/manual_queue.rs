#![forbid(unsafe_code)]

//! Deterministic deferred executor.
//!
//! Jobs accumulate until [`ManualQueue::run_pending`] drains them on the
//! calling thread. While draining, that thread counts as the executor
//! thread, so UI-affinity assertions work the same as with a real queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

use ctrack_core::{DeferredExecutor, ExecutorError, Job};

/// A FIFO executor driven explicitly by the test.
#[derive(Default)]
pub struct ManualQueue {
    jobs: Mutex<VecDeque<Job>>,
    draining_on: Mutex<Option<ThreadId>>,
    closed: AtomicBool,
    submitted: AtomicU64,
}

impl ManualQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Jobs accepted since creation.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Run jobs in FIFO order until the queue is empty, including jobs
    /// submitted by the jobs themselves. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        *self
            .draining_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: jobs may submit more work.
            let next = self
                .jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(job) = next else { break };
            job();
            ran += 1;
        }
        *self
            .draining_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        tracing::trace!(ran, "manual_queue.drained");
        ran
    }

    /// Refuse all further submissions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl DeferredExecutor for ManualQueue {
    fn submit(&self, job: Job) -> Result<(), ExecutorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecutorError::Closed);
        }
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_executor_thread(&self) -> bool {
        *self
            .draining_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(thread::current().id())
    }
}

impl std::fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualQueue")
            .field("pending", &self.pending())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn nothing_runs_until_drained() {
        let q = ManualQueue::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        q.submit(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert_eq!(q.pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(q.run_pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn nested_submissions_run_in_same_drain() {
        let q = Arc::new(ManualQueue::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (q2, o1) = (Arc::clone(&q), Arc::clone(&order));
        q.submit(Box::new(move || {
            o1.lock().unwrap().push(1);
            let o2 = Arc::clone(&o1);
            q2.submit(Box::new(move || o2.lock().unwrap().push(3)))
                .unwrap();
        }))
        .unwrap();
        let o = Arc::clone(&order);
        q.submit(Box::new(move || o.lock().unwrap().push(2))).unwrap();
        assert_eq!(q.run_pending(), 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn executor_thread_only_while_draining() {
        let q = Arc::new(ManualQueue::new());
        assert!(!q.is_executor_thread());
        let seen = Arc::new(AtomicBool::new(false));
        let (q2, s) = (Arc::clone(&q), Arc::clone(&seen));
        q.submit(Box::new(move || s.store(q2.is_executor_thread(), Ordering::SeqCst)))
            .unwrap();
        q.run_pending();
        assert!(seen.load(Ordering::SeqCst));
        assert!(!q.is_executor_thread());
    }

    #[test]
    fn closed_queue_refuses() {
        let q = ManualQueue::new();
        q.close();
        assert_eq!(q.submit(Box::new(|| {})), Err(ExecutorError::Closed));
        assert_eq!(q.submitted(), 0);
    }
}
