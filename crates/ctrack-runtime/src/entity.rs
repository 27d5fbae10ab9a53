#![forbid(unsafe_code)]

//! Change-aware entities.
//!
//! A [`TrackedEntity<P>`] owns a [`Registry<P>`] whose broadcast hook is a
//! [`DirtyGate`]. Anything that fires the entity's registry (the entity
//! itself through [`touch`](TrackedEntity::touch), or an observed child
//! through a [`ChangeForwarder`]) drives the dirty state machine before the
//! entity's own listeners see the notification.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use ctrack_core::UiQueue;
//! use ctrack_runtime::{Property, TrackedEntity};
//!
//! let ui = Arc::new(UiQueue::start().unwrap());
//! let doc = TrackedEntity::new(ui.clone(), "doc-1");
//! let title = Property::new(ui.clone(), String::new());
//!
//! doc.observe(title.registry()).unwrap();
//! title.set("loaded from disk".into()); // construction-time change
//! doc.mark_initialized();
//! assert!(!doc.is_modified());
//!
//! title.set("edited".into());
//! assert!(doc.is_modified());
//!
//! doc.saved();
//! assert!(!doc.is_modified());
//! ```
//!
//! # Invariants
//!
//! 1. Before `mark_initialized()`, notifications are dropped: no delivery,
//!    no flag change.
//! 2. Only the first change after initialization or `saved()` flips the flag;
//!    every change while dirty is still delivered to listeners.
//! 3. Each `observe(child)` places exactly one forwarder on `child`;
//!    `stop_observing(child)` removes one, silently doing nothing if none is
//!    left.
//! 4. Dropping the entity removes every forwarder it placed on children that
//!    are still alive.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ctrack_core::{
    DeferredExecutor, Dispatch, ListenerRef, Registry, RegistryConfig, RegistryError, RegistryId,
};
use tracing::{debug, trace};

use crate::dirty::{DirtyGate, DirtyState};
use crate::forwarder::ChangeForwarder;

/// Construction options for [`TrackedEntity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    /// Entity kind shown in log events. Default: `"entity"`.
    pub kind: &'static str,
    /// Configuration of the entity's own registry.
    pub registry: RegistryConfig,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            kind: "entity",
            registry: RegistryConfig::default(),
        }
    }
}

impl EntityConfig {
    #[must_use]
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

/// One forwarder placed on a child registry.
struct Observation {
    child: RegistryId,
    /// Whether the child registry still exists.
    alive: Box<dyn Fn() -> bool + Send>,
    /// Unregisters the forwarder; `false` if the child or forwarder is gone.
    detach: Box<dyn FnOnce() -> bool + Send>,
}

/// An entity that knows whether it has unsaved changes.
pub struct TrackedEntity<P> {
    registry: Registry<P>,
    gate: Arc<DirtyGate>,
    identity: P,
    kind: &'static str,
    observations: Mutex<Vec<Observation>>,
}

impl<P: Clone + Send + Sync + 'static> TrackedEntity<P> {
    /// New entity in `CleanUninitialized`, identified by `identity` when it
    /// forwards changes of its children.
    #[must_use]
    pub fn new(executor: Arc<dyn DeferredExecutor>, identity: P) -> Self {
        Self::with_config(executor, identity, EntityConfig::default())
    }

    #[must_use]
    pub fn with_config(
        executor: Arc<dyn DeferredExecutor>,
        identity: P,
        config: EntityConfig,
    ) -> Self {
        let gate = Arc::new(DirtyGate::new(config.kind));
        let registry = Registry::<P>::builder(executor)
            .config(config.registry)
            .hook(gate.clone())
            .build();
        Self {
            registry,
            gate,
            identity,
            kind: config.kind,
            observations: Mutex::new(Vec::new()),
        }
    }

    /// Fire a change on this entity with an explicit payload.
    pub fn notify(&self, payload: P) {
        self.registry.notify(payload);
    }

    /// Fire a change on this entity with its identity payload.
    pub fn touch(&self) {
        self.registry.notify(self.identity.clone());
    }

    /// Subscribe to `child`: every change there re-fires this entity's
    /// registry with the identity payload.
    pub fn observe<C>(&self, child: &Registry<C>) -> Result<(), RegistryError>
    where
        C: Clone + Send + Sync + 'static,
    {
        let forwarder = ListenerRef::<C>::new(ChangeForwarder::new(
            &self.registry,
            self.identity.clone(),
        ));
        child.register(forwarder.clone(), Dispatch::Immediate)?;

        let weak_child = child.downgrade();
        let liveness = child.downgrade();
        let mut observations = self.observations();
        prune_dead(&mut observations);
        observations.push(Observation {
            child: child.id(),
            alive: Box::new(move || liveness.upgrade().is_some()),
            detach: Box::new(move || {
                weak_child
                    .upgrade()
                    .is_some_and(|c| c.unregister(&forwarder).is_ok())
            }),
        });
        drop(observations);
        debug!(
            entity = self.kind,
            registry = %self.registry.id(),
            child = %child.id(),
            "entity.observe"
        );
        Ok(())
    }
}

impl<P> TrackedEntity<P> {
    fn observations(&self) -> MutexGuard<'_, Vec<Observation>> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The entity's own registry; register listeners here.
    #[must_use]
    pub fn registry(&self) -> &Registry<P> {
        &self.registry
    }

    #[must_use]
    pub fn identity(&self) -> &P {
        &self.identity
    }

    #[must_use]
    pub fn state(&self) -> DirtyState {
        self.gate.state()
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.gate.is_modified()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    /// How many times the entity went from clean to dirty.
    #[must_use]
    pub fn dirty_transitions(&self) -> u64 {
        self.gate.transitions()
    }

    /// Open the gate. Call once construction (including `observe` calls and
    /// default field assignment) is complete. No-op when already initialized.
    pub fn mark_initialized(&self) {
        self.gate.mark_initialized();
    }

    /// Record that the entity was persisted. Clears the modified flag.
    pub fn saved(&self) {
        self.gate.saved();
    }

    /// Remove the forwarder placed on `child` by an earlier `observe`.
    ///
    /// Silent when there is no such relationship. Returns whether a
    /// forwarder was actually unregistered.
    pub fn stop_observing<C>(&self, child: &Registry<C>) -> bool {
        let child_id = child.id();
        let observation = {
            let mut observations = self.observations();
            observations
                .iter()
                .position(|o| o.child == child_id)
                .map(|index| observations.remove(index))
        };
        match observation {
            Some(observation) => {
                let detached = (observation.detach)();
                debug!(entity = self.kind, child = %child_id, detached, "entity.stop_observing");
                detached
            }
            None => {
                trace!(entity = self.kind, child = %child_id, "entity.stop_observing_unknown");
                false
            }
        }
    }

    /// Whether at least one forwarder is placed on `child`.
    #[must_use]
    pub fn is_observing<C>(&self, child: &Registry<C>) -> bool {
        let child_id = child.id();
        self.observations().iter().any(|o| o.child == child_id)
    }

    /// Number of observations whose child is still alive.
    #[must_use]
    pub fn observed_count(&self) -> usize {
        let mut observations = self.observations();
        prune_dead(&mut observations);
        observations.len()
    }

    /// Drop every observation, unregistering forwarders from live children.
    /// Returns how many forwarders were actually removed.
    pub fn release_all(&self) -> usize {
        let drained: Vec<Observation> = self.observations().drain(..).collect();
        drained
            .into_iter()
            .map(|o| (o.detach)())
            .filter(|detached| *detached)
            .count()
    }
}

/// Forget observations of children that no longer exist.
fn prune_dead(observations: &mut Vec<Observation>) {
    let before = observations.len();
    observations.retain(|o| (o.alive)());
    let pruned = before - observations.len();
    if pruned > 0 {
        trace!(pruned, "entity.pruned_dead_children");
    }
}

impl<P> Drop for TrackedEntity<P> {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            trace!(entity = self.kind, released, "entity.released");
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for TrackedEntity<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntity")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("state", &self.state())
            .field("observed", &self.observed_count())
            .finish()
    }
}
