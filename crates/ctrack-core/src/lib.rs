#![forbid(unsafe_code)]

//! Core: listener registry, deferred dispatch, and change-notification
//! primitives.
//!
//! - [`Registry`]: ordered, thread-safe listener collections with
//!   snapshot-based fan-out.
//! - [`Listener`] / [`ListenerRef`]: the callback capability and its shared
//!   handle.
//! - [`DeferredExecutor`]: the injected "run later" queue deferred listeners
//!   are delivered through; [`UiQueue`] is the threaded implementation.

pub mod error;
pub mod executor;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod ui_queue;

pub use error::{ExecutorError, RegistryError};
pub use executor::{DeferredExecutor, Job};
pub use listener::{Dispatch, Listener, ListenerId, ListenerRef};
pub use registry::{
    Broadcast, BroadcastHook, Registry, RegistryBuilder, RegistryConfig, RegistryId,
    RegistryStats, WeakRegistry,
};
pub use ui_queue::{UiQueue, UiQueueConfig, UiQueueStats};
