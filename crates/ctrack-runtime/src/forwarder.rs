#![forbid(unsafe_code)]

//! Listener adapter that re-fires another registry.
//!
//! A [`ChangeForwarder`] is registered on a *source* registry like any other
//! listener. Whenever the source fires, the forwarder calls
//! `target.notify(payload)` with the payload it captured at construction.
//! It never filters, coalesces or transforms; any gating belongs to the
//! target's own [`BroadcastHook`](ctrack_core::BroadcastHook).
//!
//! The forwarder holds the target weakly. Once the target registry is gone,
//! invocations are silent no-ops, so a dropped owner is never notified.

use std::fmt;

use ctrack_core::{Listener, Registry, RegistryId, WeakRegistry};
use tracing::trace;

/// Re-fires `target` with a fixed payload whenever the source fires.
pub struct ChangeForwarder<Q> {
    target: WeakRegistry<Q>,
    payload: Q,
}

impl<Q> ChangeForwarder<Q> {
    /// Bind to `target`, forwarding `payload` on every invocation.
    #[must_use]
    pub fn new(target: &Registry<Q>, payload: Q) -> Self {
        Self {
            target: target.downgrade(),
            payload,
        }
    }

    #[must_use]
    pub fn target_id(&self) -> RegistryId {
        self.target.id()
    }

    #[must_use]
    pub fn payload(&self) -> &Q {
        &self.payload
    }

    /// Whether the target registry still exists.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.target.upgrade().is_some()
    }
}

impl<Q: Clone + Send + Sync + 'static> ChangeForwarder<Q> {
    /// Fire the target once. Returns `false` if the target is gone.
    pub fn forward(&self) -> bool {
        match self.target.upgrade() {
            Some(target) => {
                target.notify(self.payload.clone());
                true
            }
            None => {
                trace!(target = %self.target.id(), "forwarder.target_gone");
                false
            }
        }
    }
}

impl<P, Q> Listener<P> for ChangeForwarder<Q>
where
    P: 'static,
    Q: Clone + Send + Sync + 'static,
{
    fn on_change(&self, source: &Registry<P>, _payload: &P) {
        trace!(source = %source.id(), target = %self.target.id(), "forwarder.fire");
        self.forward();
    }

    fn label(&self) -> &'static str {
        "forwarder"
    }
}

impl<Q: fmt::Debug> fmt::Debug for ChangeForwarder<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeForwarder")
            .field("target", &self.target.id())
            .field("payload", &self.payload)
            .finish()
    }
}
