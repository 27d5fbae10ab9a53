#![forbid(unsafe_code)]

//! Listener registry: the observable base every change source is built on.
//!
//! A [`Registry<P>`] keeps two ordered listener collections behind one mutex:
//!
//! - **immediate** listeners run synchronously on the thread calling
//!   [`notify`](Registry::notify);
//! - **deferred** listeners run later, as a single batch job on the
//!   [`DeferredExecutor`] injected at construction.
//!
//! # Invariants
//!
//! 1. Listeners fire in collection order. `register` appends,
//!    `register_first` prepends.
//! 2. `notify` delivers from a point-in-time copy of each collection. A
//!    listener that registers or unregisters during delivery never causes
//!    another listener of the same snapshot to be skipped or invoked twice.
//! 3. The lock is never held while a listener runs, so listeners may re-enter
//!    the registry (register, unregister, notify) freely.
//! 4. Deferred listeners never run on the notifying thread's stack; one
//!    `notify` produces at most one executor job.
//! 5. Duplicate registrations are allowed; each `unregister` removes exactly
//!    one occurrence.
//!
//! # Broadcast hook
//!
//! A [`BroadcastHook`] installed through [`RegistryBuilder::hook`] is
//! consulted before every delivery and may suppress it. This is how
//! change-aware entities gate their own notifications without overriding
//! the fan-out itself.
//!
//! # Failure Modes
//!
//! - **Listener panics**: caught, logged at WARN, counted in
//!   [`RegistryStats::listener_panics`]; delivery continues with the next
//!   listener (unless [`RegistryConfig::isolate_panics`] is off).
//! - **Hook panics**: caught, logged at WARN, counted in
//!   [`RegistryStats::hook_panics`]; the notification is delivered as if the
//!   hook had returned `Continue` (unless panic isolation is off).
//! - **Executor closed**: the deferred batch is dropped, logged at WARN and
//!   counted in [`RegistryStats::dropped_batches`].
//! - **Concurrent notify**: deliveries of two `notify` calls on different
//!   threads may interleave. Listeners must tolerate concurrent invocation.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{trace, warn};

use crate::error::{RegistryError, Result};
use crate::executor::{DeferredExecutor, panic_message};
use crate::listener::{Dispatch, ListenerRef};

// ─── RegistryId ──────────────────────────────────────────────────────────────

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique registry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(u64);

impl RegistryId {
    fn next() -> Self {
        Self(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

// ─── Hook ────────────────────────────────────────────────────────────────────

/// Verdict of a [`BroadcastHook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// Deliver to listeners as usual.
    Continue,
    /// Drop this notification entirely.
    Suppress,
}

/// Pre-delivery hook consulted by [`Registry::notify`].
pub trait BroadcastHook<P>: Send + Sync {
    fn before_broadcast(&self, payload: &P) -> Broadcast;
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Per-registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Human-readable name added to log events. Default: none.
    pub label: Option<String>,
    /// Catch listener panics and keep delivering. Default: true.
    pub isolate_panics: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            label: None,
            isolate_panics: true,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_isolate_panics(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
    notifications: AtomicU64,
    suppressed: AtomicU64,
    deliveries: AtomicU64,
    deferred_batches: AtomicU64,
    dropped_batches: AtomicU64,
    listener_panics: AtomicU64,
    hook_panics: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of a registry's monotonic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// `notify` calls, suppressed ones included.
    pub notifications: u64,
    /// `notify` calls the hook suppressed.
    pub suppressed: u64,
    /// Individual listener invocations, immediate and deferred.
    pub deliveries: u64,
    /// Deferred batches accepted by the executor.
    pub deferred_batches: u64,
    /// Deferred batches the executor refused.
    pub dropped_batches: u64,
    /// Listener invocations that panicked.
    pub listener_panics: u64,
    /// Broadcast hook calls that panicked.
    pub hook_panics: u64,
}

// ─── Registry ────────────────────────────────────────────────────────────────

struct Lists<P> {
    immediate: Vec<ListenerRef<P>>,
    deferred: Vec<ListenerRef<P>>,
}

struct Inner<P> {
    id: RegistryId,
    config: RegistryConfig,
    lists: Mutex<Lists<P>>,
    executor: Arc<dyn DeferredExecutor>,
    hook: Option<Arc<dyn BroadcastHook<P>>>,
    counters: Counters,
}

/// Ordered, thread-safe listener registry.
///
/// Cloning a `Registry` creates a new handle to the **same** listeners.
pub struct Registry<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for Registry<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lists = self.lists();
        f.debug_struct("Registry")
            .field("id", &self.inner.id)
            .field("label", &self.inner.config.label)
            .field("immediate", &lists.immediate.len())
            .field("deferred", &lists.deferred.len())
            .field("hooked", &self.inner.hook.is_some())
            .finish()
    }
}

/// Builder for registries that need a config or a hook.
pub struct RegistryBuilder<P> {
    executor: Arc<dyn DeferredExecutor>,
    config: RegistryConfig,
    hook: Option<Arc<dyn BroadcastHook<P>>>,
}

impl<P> RegistryBuilder<P> {
    #[must_use]
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Install the pre-delivery hook. Replaces any previous hook.
    #[must_use]
    pub fn hook(mut self, hook: Arc<dyn BroadcastHook<P>>) -> Self {
        self.hook = Some(hook);
        self
    }

    #[must_use]
    pub fn build(self) -> Registry<P> {
        Registry {
            inner: Arc::new(Inner {
                id: RegistryId::next(),
                config: self.config,
                lists: Mutex::new(Lists {
                    immediate: Vec::new(),
                    deferred: Vec::new(),
                }),
                executor: self.executor,
                hook: self.hook,
                counters: Counters::default(),
            }),
        }
    }
}

impl<P> Registry<P> {
    /// Registry with default config and no hook.
    #[must_use]
    pub fn new(executor: Arc<dyn DeferredExecutor>) -> Self {
        Self::builder(executor).build()
    }

    pub fn builder(executor: Arc<dyn DeferredExecutor>) -> RegistryBuilder<P> {
        RegistryBuilder {
            executor,
            config: RegistryConfig::default(),
            hook: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> RegistryId {
        self.inner.id
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.inner.config.label.as_deref()
    }

    /// The executor deferred batches are submitted to.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn DeferredExecutor> {
        &self.inner.executor
    }

    /// Non-owning handle to this registry.
    #[must_use]
    pub fn downgrade(&self) -> WeakRegistry<P> {
        WeakRegistry {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same registry.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lists(&self) -> MutexGuard<'_, Lists<P>> {
        self.inner
            .lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `listener` to the collection chosen by `dispatch`.
    ///
    /// Fails with [`RegistryError::InvalidArgument`] when `listener` is
    /// `None`.
    pub fn register(
        &self,
        listener: impl Into<Option<ListenerRef<P>>>,
        dispatch: Dispatch,
    ) -> Result<()> {
        let listener = listener.into().ok_or(RegistryError::InvalidArgument {
            message: "listener must be present",
        })?;
        trace!(registry = %self.inner.id, listener = %listener.id(), ?dispatch, "registry.register");
        let mut lists = self.lists();
        match dispatch {
            Dispatch::Immediate => lists.immediate.push(listener),
            Dispatch::Deferred => lists.deferred.push(listener),
        }
        Ok(())
    }

    /// Like [`register`](Self::register) but prepends, so the listener fires
    /// before every listener already in that collection.
    pub fn register_first(
        &self,
        listener: impl Into<Option<ListenerRef<P>>>,
        dispatch: Dispatch,
    ) -> Result<()> {
        let listener = listener.into().ok_or(RegistryError::InvalidArgument {
            message: "listener must be present",
        })?;
        trace!(registry = %self.inner.id, listener = %listener.id(), ?dispatch, "registry.register_first");
        let mut lists = self.lists();
        match dispatch {
            Dispatch::Immediate => lists.immediate.insert(0, listener),
            Dispatch::Deferred => lists.deferred.insert(0, listener),
        }
        Ok(())
    }

    /// Remove the first occurrence of `listener`, searching the immediate
    /// collection before the deferred one.
    ///
    /// Fails with [`RegistryError::NotFound`] when it is in neither.
    pub fn unregister(&self, listener: &ListenerRef<P>) -> Result<()> {
        let mut lists = self.lists();
        let removed = remove_first(&mut lists.immediate, listener)
            || remove_first(&mut lists.deferred, listener);
        drop(lists);
        if removed {
            trace!(registry = %self.inner.id, listener = %listener.id(), "registry.unregister");
            Ok(())
        } else {
            Err(RegistryError::NotFound {
                registry: self.inner.id,
                listener: listener.id(),
            })
        }
    }

    /// Whether `listener` is registered in either collection.
    #[must_use]
    pub fn contains(&self, listener: &ListenerRef<P>) -> bool {
        let lists = self.lists();
        lists.immediate.iter().any(|l| l.same_as(listener))
            || lists.deferred.iter().any(|l| l.same_as(listener))
    }

    /// Total registrations across both collections.
    #[must_use]
    pub fn len(&self) -> usize {
        let lists = self.lists();
        lists.immediate.len() + lists.deferred.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn immediate_len(&self) -> usize {
        self.lists().immediate.len()
    }

    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.lists().deferred.len()
    }

    /// Remove every listener from both collections.
    pub fn clear(&self) {
        let mut lists = self.lists();
        lists.immediate.clear();
        lists.deferred.clear();
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let c = &self.inner.counters;
        RegistryStats {
            notifications: c.notifications.load(Ordering::Relaxed),
            suppressed: c.suppressed.load(Ordering::Relaxed),
            deliveries: c.deliveries.load(Ordering::Relaxed),
            deferred_batches: c.deferred_batches.load(Ordering::Relaxed),
            dropped_batches: c.dropped_batches.load(Ordering::Relaxed),
            listener_panics: c.listener_panics.load(Ordering::Relaxed),
            hook_panics: c.hook_panics.load(Ordering::Relaxed),
        }
    }

    /// Ask the hook for a verdict, isolating a panic if configured to.
    fn verdict(&self, hook: &dyn BroadcastHook<P>, payload: &P) -> Broadcast {
        if !self.inner.config.isolate_panics {
            return hook.before_broadcast(payload);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| hook.before_broadcast(payload))) {
            Ok(verdict) => verdict,
            Err(panic) => {
                Counters::bump(&self.inner.counters.hook_panics);
                warn!(
                    registry = %self.inner.id,
                    label = self.inner.config.label.as_deref().unwrap_or(""),
                    panic = %panic_message(panic.as_ref()),
                    "registry.hook_panicked"
                );
                Broadcast::Continue
            }
        }
    }

    /// Invoke one listener, isolating a panic if configured to.
    fn deliver(&self, listener: &ListenerRef<P>, payload: &P) {
        Counters::bump(&self.inner.counters.deliveries);
        if !self.inner.config.isolate_panics {
            listener.invoke(self, payload);
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(self, payload)));
        if let Err(panic) = outcome {
            Counters::bump(&self.inner.counters.listener_panics);
            warn!(
                registry = %self.inner.id,
                label = self.inner.config.label.as_deref().unwrap_or(""),
                listener = %listener.id(),
                kind = listener.label(),
                panic = %panic_message(panic.as_ref()),
                "registry.listener_panicked"
            );
        }
    }
}

impl<P: Clone + Send + Sync + 'static> Registry<P> {
    /// Fan `payload` out to every listener.
    ///
    /// Immediate listeners run now, in order, on this thread. If any
    /// deferred listeners are registered, one batch job delivering to all of
    /// them (in order) is submitted to the executor. Never fails; see the
    /// module docs for how listener failures are handled.
    pub fn notify(&self, payload: P) {
        Counters::bump(&self.inner.counters.notifications);

        if let Some(hook) = &self.inner.hook
            && self.verdict(&**hook, &payload) == Broadcast::Suppress
        {
            Counters::bump(&self.inner.counters.suppressed);
            trace!(registry = %self.inner.id, "registry.suppressed");
            return;
        }

        let immediate = self.lists().immediate.clone();
        for listener in &immediate {
            self.deliver(listener, &payload);
        }

        let deferred = self.lists().deferred.clone();
        if deferred.is_empty() {
            return;
        }

        let registry = self.clone();
        let batch_len = deferred.len();
        let job = Box::new(move || {
            for listener in &deferred {
                registry.deliver(listener, &payload);
            }
        });
        match self.inner.executor.submit(job) {
            Ok(()) => {
                Counters::bump(&self.inner.counters.deferred_batches);
                trace!(registry = %self.inner.id, batch_len, "registry.deferred_batch");
            }
            Err(err) => {
                Counters::bump(&self.inner.counters.dropped_batches);
                warn!(
                    registry = %self.inner.id,
                    batch_len,
                    error = %err,
                    "registry.deferred_batch_dropped"
                );
            }
        }
    }
}

fn remove_first<P>(list: &mut Vec<ListenerRef<P>>, listener: &ListenerRef<P>) -> bool {
    match list.iter().position(|l| l.same_as(listener)) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

// ─── WeakRegistry ────────────────────────────────────────────────────────────

/// Non-owning registry handle.
pub struct WeakRegistry<P> {
    id: RegistryId,
    inner: Weak<Inner<P>>,
}

impl<P> Clone for WeakRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for WeakRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("id", &self.id)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<P> WeakRegistry<P> {
    /// Id of the registry this handle was created from (valid even after it
    /// is gone).
    #[must_use]
    pub fn id(&self) -> RegistryId {
        self.id
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<Registry<P>> {
        self.inner.upgrade().map(|inner| Registry { inner })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
