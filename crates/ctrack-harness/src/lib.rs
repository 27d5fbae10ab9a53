#![forbid(unsafe_code)]

//! Test harness and reference fixtures for ctrack.
//!
//! - [`ManualQueue`]: a [`DeferredExecutor`](ctrack_core::DeferredExecutor)
//!   whose jobs only run when the test says so.
//! - [`RecordingListener`]: a listener that remembers every call, with the
//!   thread it ran on.

pub mod manual_queue;
pub mod recording;

pub use manual_queue::ManualQueue;
pub use recording::{Call, RecordingListener};
