#![forbid(unsafe_code)]

//! Listener capability and the shared handle registries store.
//!
//! A [`Listener`] receives the registry that fired and a reference to the
//! payload. Any `Fn(&Registry<P>, &P)` closure that is `Send + Sync` is a
//! listener, so most call sites never implement the trait by hand.
//!
//! Registries store listeners as [`ListenerRef`] handles. Identity is the
//! identity of the shared allocation: clones of one handle are the same
//! listener, two handles built from equal closures are not.

use std::fmt;
use std::sync::Arc;

use crate::registry::Registry;

/// A registered callback.
///
/// Implementations may call back into any registry (including `source`)
/// during `on_change`: registries never hold their lock while delivering.
pub trait Listener<P>: Send + Sync {
    /// Handle one notification fired by `source`.
    fn on_change(&self, source: &Registry<P>, payload: &P);

    /// Short label used in log fields.
    fn label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<P, F> Listener<P> for F
where
    F: Fn(&Registry<P>, &P) + Send + Sync + 'static,
{
    fn on_change(&self, source: &Registry<P>, payload: &P) {
        self(source, payload)
    }

    fn label(&self) -> &'static str {
        "closure"
    }
}

/// Which collection a listener is registered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dispatch {
    /// Invoked synchronously on the thread that calls `notify`.
    #[default]
    Immediate,
    /// Invoked later, as part of one batch on the deferred executor.
    Deferred,
}

impl Dispatch {
    /// `Deferred` when `deferred` is true, `Immediate` otherwise.
    #[must_use]
    pub const fn from_flag(deferred: bool) -> Self {
        if deferred {
            Self::Deferred
        } else {
            Self::Immediate
        }
    }

    #[must_use]
    pub const fn is_deferred(self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Address-derived identifier of a [`ListenerRef`], for logs and errors.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener@{:#x}", self.0)
    }
}

/// Shared, cloneable handle to a listener.
pub struct ListenerRef<P> {
    inner: Arc<dyn Listener<P>>,
}

impl<P> Clone for ListenerRef<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: 'static> ListenerRef<P> {
    /// Wrap a listener in a fresh handle.
    pub fn new(listener: impl Listener<P> + 'static) -> Self {
        Self {
            inner: Arc::new(listener),
        }
    }

    /// Wrap a closure. Unlike [`new`](Self::new), argument types are
    /// inferred, so `ListenerRef::from_fn(|_, v| ..)` works without
    /// annotations.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Registry<P>, &P) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Wrap an already shared listener, keeping the caller's `Arc` usable for
    /// inspection (e.g. a recording fixture).
    pub fn from_arc<L: Listener<P> + 'static>(listener: Arc<L>) -> Self {
        Self { inner: listener }
    }
}

impl<P> ListenerRef<P> {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        ListenerId(Arc::as_ptr(&self.inner).cast::<()>() as usize)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.inner.label()
    }

    /// Whether both handles point at the same listener.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    #[inline]
    pub(crate) fn invoke(&self, source: &Registry<P>, payload: &P) {
        self.inner.on_change(source, payload);
    }
}

impl<P> PartialEq for ListenerRef<P> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<P> Eq for ListenerRef<P> {}

impl<P> fmt::Debug for ListenerRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRef")
            .field("id", &self.id())
            .field("label", &self.label())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Listener<u32> for Noop {
        fn on_change(&self, _source: &Registry<u32>, _payload: &u32) {}
    }

    #[test]
    fn clones_share_identity() {
        let a = ListenerRef::<u32>::new(Noop);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn separate_handles_differ() {
        let a = ListenerRef::<u32>::from_fn(|_, _| {});
        let b = ListenerRef::<u32>::from_fn(|_, _| {});
        assert_ne!(a, b);
    }

    #[test]
    fn from_arc_keeps_allocation() {
        let shared = Arc::new(Noop);
        let a = ListenerRef::<u32>::from_arc(Arc::clone(&shared));
        let b = ListenerRef::<u32>::from_arc(shared);
        assert!(a.same_as(&b));
    }

    #[test]
    fn labels() {
        let closure = ListenerRef::<u32>::from_fn(|_, _| {});
        assert_eq!(closure.label(), "closure");
        assert!(ListenerRef::<u32>::new(Noop).label().ends_with("Noop"));
    }

    #[test]
    fn dispatch_from_flag() {
        assert_eq!(Dispatch::from_flag(true), Dispatch::Deferred);
        assert_eq!(Dispatch::from_flag(false), Dispatch::Immediate);
        assert!(!Dispatch::default().is_deferred());
    }

    #[test]
    fn debug_mentions_id() {
        let a = ListenerRef::<u32>::new(Noop);
        let dbg = format!("{a:?}");
        assert!(dbg.contains("listener@0x"));
        assert_eq!(format!("{:?}", a.id()), a.id().to_string());
    }

    /// Identity queries need no bound on the payload type.
    fn identity_of<P>(a: &ListenerRef<P>, b: &ListenerRef<P>) -> (ListenerId, bool) {
        (a.id(), a.same_as(b))
    }

    #[test]
    fn identity_is_payload_agnostic() {
        let a = ListenerRef::<u32>::new(Noop);
        let (id, same) = identity_of(&a, &a.clone());
        assert_eq!(id, a.id());
        assert!(same);
    }
}
