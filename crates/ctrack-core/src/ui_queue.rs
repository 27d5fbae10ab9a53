#![forbid(unsafe_code)]

//! Dedicated UI-affined execution queue.
//!
//! [`UiQueue`] owns one named worker thread that drains an unbounded FIFO
//! channel of [`Job`]s. It is the sole place deferred listeners run, which
//! gives them the "one UI thread" guarantee regardless of which thread fired
//! the notification.
//!
//! # Ordering
//!
//! - Jobs run strictly in the order they were accepted by `submit`.
//! - Each job runs to completion before the next starts, so a batch submitted
//!   by one `notify` call never interleaves with another batch.
//!
//! # Shutdown
//!
//! [`UiQueue::shutdown`] closes the submission side. The worker keeps
//! draining until every job accepted before the close has run, then exits.
//! Submitting afterwards fails with [`ExecutorError::Closed`].
//!
//! # Failure Modes
//!
//! - **Job panics**: the panic is caught and logged at WARN; the worker keeps
//!   going with the next job.
//! - **Spawn failure**: returned from [`UiQueue::start`] as an `io::Error`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ctrack_core::executor::DeferredExecutor;
//! use ctrack_core::ui_queue::UiQueue;
//!
//! let queue = Arc::new(UiQueue::start().unwrap());
//! queue.submit(Box::new(|| println!("on the ui thread"))).unwrap();
//! queue.wait_idle().unwrap();
//! queue.shutdown();
//! ```

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, trace, warn};

use crate::error::ExecutorError;
use crate::executor::{DeferredExecutor, Job, panic_message};

/// Environment variable overriding the worker thread name.
pub const ENV_THREAD_NAME: &str = "CTRACK_UI_THREAD_NAME";
/// Environment variable overriding the worker stack size in bytes.
pub const ENV_STACK_SIZE: &str = "CTRACK_UI_STACK_SIZE";

/// Configuration for the UI queue worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiQueueConfig {
    /// Worker thread name. Default: `"ctrack-ui"`.
    pub thread_name: String,
    /// Worker stack size in bytes. Default: platform default.
    pub stack_size: Option<usize>,
}

impl Default for UiQueueConfig {
    fn default() -> Self {
        Self {
            thread_name: "ctrack-ui".into(),
            stack_size: None,
        }
    }
}

impl UiQueueConfig {
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Defaults overridden by `CTRACK_UI_THREAD_NAME` / `CTRACK_UI_STACK_SIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable lookup.
    ///
    /// Unparseable stack sizes are ignored with a warning.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(name) = lookup(ENV_THREAD_NAME).filter(|v| !v.trim().is_empty()) {
            config.thread_name = name.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_STACK_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(bytes) if bytes > 0 => config.stack_size = Some(bytes),
                _ => warn!(value = %raw, "ui_queue.bad_stack_size"),
            }
        }
        config
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiQueueStats {
    /// Jobs accepted by `submit`.
    pub submitted: u64,
    /// Jobs that ran (including those that panicked).
    pub completed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

/// Handle to a running UI queue worker.
///
/// Share it as `Arc<UiQueue>` (or `Arc<dyn DeferredExecutor>`) between every
/// registry that should deliver on the same UI thread.
pub struct UiQueue {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    thread_name: String,
    counters: Arc<QueueCounters>,
}

impl UiQueue {
    /// Spawn a worker with [`UiQueueConfig::default`].
    pub fn start() -> io::Result<Self> {
        Self::with_config(UiQueueConfig::default())
    }

    /// Spawn a worker with an explicit configuration.
    pub fn with_config(config: UiQueueConfig) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let counters = Arc::new(QueueCounters::default());

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }
        let worker_counters = Arc::clone(&counters);
        let handle = builder.spawn(move || queue_loop(rx, &worker_counters))?;
        let thread_id = handle.thread().id();
        debug!(thread = %config.thread_name, "ui_queue.started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            thread_id,
            thread_name: config.thread_name,
            counters,
        })
    }

    /// Id of the worker thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Block until every job accepted before this call has run.
    pub fn wait_idle(&self) -> Result<(), ExecutorError> {
        if self.is_executor_thread() {
            return Err(ExecutorError::WouldDeadlock);
        }
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        self.submit(Box::new(move || {
            let _ = tx.send(());
        }))?;
        rx.recv().map_err(|_| ExecutorError::Closed)
    }

    #[must_use]
    pub fn stats(&self) -> UiQueueStats {
        UiQueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and, unless called from the worker itself, wait for
    /// it to drain and exit. Idempotent.
    pub fn shutdown(&self) {
        // Dropping the only sender lets the worker's `recv` fail once the
        // backlog is empty.
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        debug!(thread = %self.thread_name, "ui_queue.closing");

        if self.is_executor_thread() {
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl DeferredExecutor for UiQueue {
    fn submit(&self, job: Job) -> Result<(), ExecutorError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(ExecutorError::Closed)?;
        sender.send(job).map_err(|_| ExecutorError::Closed)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_executor_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for UiQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for UiQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiQueue")
            .field("thread_name", &self.thread_name)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Worker loop: run jobs in arrival order until every sender is gone.
fn queue_loop(rx: mpsc::Receiver<Job>, counters: &QueueCounters) {
    while let Ok(job) = rx.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            warn!(
                panic = %panic_message(payload.as_ref()),
                "ui_queue.job_panicked"
            );
        }
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
    trace!("ui_queue.stopped");
}
