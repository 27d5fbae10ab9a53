#![forbid(unsafe_code)]

//! The "run later" capability deferred listeners are delivered through.
//!
//! A registry never spawns threads itself. It is handed an
//! `Arc<dyn DeferredExecutor>` at construction and submits one job per
//! `notify` call that has deferred listeners. The production implementation
//! is [`UiQueue`](crate::ui_queue::UiQueue); tests usually use the
//! deterministic `ManualQueue` from `ctrack-harness`.
//!
//! # Contract
//!
//! 1. Jobs run in submission order, one at a time, on a single logical
//!    execution context.
//! 2. `submit` never runs the job inline on the caller's stack.
//! 3. A job accepted by `submit` eventually runs; there is no cancellation.

use std::sync::Arc;

use crate::error::ExecutorError;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded FIFO execution context.
pub trait DeferredExecutor: Send + Sync {
    /// Queue `job` to run after every previously submitted job.
    fn submit(&self, job: Job) -> Result<(), ExecutorError>;

    /// Whether the calling thread is the one jobs run on.
    fn is_executor_thread(&self) -> bool;
}

impl<E: DeferredExecutor + ?Sized> DeferredExecutor for Arc<E> {
    fn submit(&self, job: Job) -> Result<(), ExecutorError> {
        (**self).submit(job)
    }

    fn is_executor_thread(&self) -> bool {
        (**self).is_executor_thread()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn panic_message_variants() {
        let caught = panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static text");

        let caught = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "formatted 7");

        let caught = panic::catch_unwind(|| panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "non-string panic payload");
    }
}
