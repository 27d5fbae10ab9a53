#![forbid(unsafe_code)]

//! Observable value cells.
//!
//! A [`Property<T>`] is the leaf of an entity graph: a value with its own
//! [`Registry<T>`]. Entities subscribe to it with
//! [`TrackedEntity::observe`](crate::TrackedEntity::observe).
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Setting a value equal to the current value is a no-op (no version bump,
//!    no notification).
//! 3. The value lock is released before listeners run, so listeners may read
//!    or set the property.
//!
//! # Failure Modes
//!
//! - **Concurrent setters**: each change is notified, but two notifications
//!   racing on different threads may reach listeners in either order.
//! - **`with` re-entrance**: calling `set` from inside the `with` closure
//!   deadlocks; read a clone instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ctrack_core::{DeferredExecutor, Registry, RegistryConfig};

/// A shared, version-tracked value that notifies on change.
pub struct Property<T> {
    value: Mutex<T>,
    version: AtomicU64,
    registry: Registry<T>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Property<T> {
    #[must_use]
    pub fn new(executor: Arc<dyn DeferredExecutor>, initial: T) -> Self {
        Self::with_config(executor, initial, RegistryConfig::default())
    }

    #[must_use]
    pub fn with_config(
        executor: Arc<dyn DeferredExecutor>,
        initial: T,
        config: RegistryConfig,
    ) -> Self {
        Self {
            value: Mutex::new(initial),
            version: AtomicU64::new(0),
            registry: Registry::builder(executor).config(config).build(),
        }
    }

    fn value(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.value().clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value())
    }

    /// Replace the value. Returns whether it changed (and listeners fired).
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.value();
            if *current == value {
                return false;
            }
            *current = value.clone();
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        self.registry.notify(value);
        true
    }

    /// Mutate in place. Notifies only if the value actually changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let changed = {
            let mut current = self.value();
            let before = current.clone();
            f(&mut current);
            if *current == before {
                None
            } else {
                self.version.fetch_add(1, Ordering::AcqRel);
                Some(current.clone())
            }
        };
        match changed {
            Some(value) => {
                self.registry.notify(value);
                true
            }
            None => false,
        }
    }
}

impl<T> Property<T> {
    /// Number of value-changing mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// The registry fired on every change, with the new value as payload.
    #[must_use]
    pub fn registry(&self) -> &Registry<T> {
        &self.registry
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Property")
            .field("value", &*value)
            .field("version", &self.version())
            .finish()
    }
}
