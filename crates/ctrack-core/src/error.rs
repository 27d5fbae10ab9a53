#![forbid(unsafe_code)]

//! Error types shared by the registry and the deferred executors.

use thiserror::Error;

use crate::listener::ListenerId;
use crate::registry::RegistryId;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Failures surfaced by structural registry operations.
///
/// `notify` never produces one of these: delivery failures are isolated and
/// logged instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A required argument was absent (e.g. `register(None, ..)`).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: &'static str },

    /// The listener is registered in neither collection.
    #[error("listener {listener} is not registered on {registry}")]
    NotFound {
        registry: RegistryId,
        listener: ListenerId,
    },
}

impl RegistryError {
    /// Whether this is the `NotFound` variant.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failures surfaced by a [`DeferredExecutor`](crate::executor::DeferredExecutor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// The queue has been shut down and accepts no further work.
    #[error("deferred queue is closed")]
    Closed,

    /// Waiting on the queue from its own thread would never return.
    #[error("cannot wait on the deferred queue from its own thread")]
    WouldDeadlock,
}
