#![forbid(unsafe_code)]

//! A listener that records every invocation.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use ctrack_core::{Listener, ListenerRef, Registry, RegistryId};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call<P> {
    pub source: RegistryId,
    pub payload: P,
    pub thread: ThreadId,
}

/// Records `(source, payload, thread)` for every call.
///
/// Keep the `Arc` to inspect calls; register the [`handle`](Self::handle).
#[derive(Debug)]
pub struct RecordingListener<P> {
    calls: Mutex<Vec<Call<P>>>,
}

impl<P: Clone + Send + 'static> RecordingListener<P> {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A registrable handle sharing this recorder.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> ListenerRef<P> {
        ListenerRef::from_arc(Arc::clone(self))
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call<P>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn payloads(&self) -> Vec<P> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.payload.clone())
            .collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether every recorded call ran on `thread`.
    #[must_use]
    pub fn all_on(&self, thread: ThreadId) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(|c| c.thread == thread)
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<P: Clone + Send + 'static> Listener<P> for RecordingListener<P> {
    fn on_change(&self, source: &Registry<P>, payload: &P) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call {
                source: source.id(),
                payload: payload.clone(),
                thread: thread::current().id(),
            });
    }

    fn label(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualQueue;
    use ctrack_core::Dispatch;

    #[test]
    fn shared_recorder_sees_calls_through_handle() {
        let exec = Arc::new(ManualQueue::new());
        let registry: Registry<&'static str> = Registry::new(exec);
        let rec = RecordingListener::shared();
        registry.register(rec.handle(), Dispatch::Immediate).unwrap();
        assert_eq!(rec.handle(), rec.handle());

        registry.notify("a");
        registry.notify("b");
        assert_eq!(rec.payloads(), vec!["a", "b"]);
        assert!(rec.all_on(thread::current().id()));
        assert!(rec.calls().iter().all(|c| c.source == registry.id()));

        rec.clear();
        assert_eq!(rec.count(), 0);
    }
}
