#![forbid(unsafe_code)]

//! ctrack public facade crate.
//!
//! Change tracking for object graphs: listener registries with immediate
//! and deferred delivery, change forwarding between registries, and a
//! dirty flag that survives construction-time noise.

pub use ctrack_core as core;
#[cfg(feature = "runtime")]
pub use ctrack_runtime as runtime;

pub mod prelude {
    pub use ctrack_core::{
        Broadcast, BroadcastHook, DeferredExecutor, Dispatch, ExecutorError, Listener,
        ListenerRef, Registry, RegistryConfig, RegistryError, UiQueue, UiQueueConfig,
    };

    #[cfg(feature = "runtime")]
    pub use ctrack_runtime::{ChangeForwarder, DirtyState, EntityConfig, Property, TrackedEntity};
}

#[cfg(all(test, feature = "runtime"))]
mod tests {
    use super::prelude::*;
    use ctrack_harness::{ManualQueue, RecordingListener};
    use std::sync::Arc;

    #[test]
    fn prelude_covers_a_full_round() {
        let exec = Arc::new(ManualQueue::new());
        let entity = TrackedEntity::new(exec.clone(), "settings");
        let volume = Property::new(exec.clone(), 3u8);
        entity.observe(volume.registry()).unwrap();
        entity.mark_initialized();

        let rec = RecordingListener::shared();
        entity
            .registry()
            .register(rec.handle(), Dispatch::Deferred)
            .unwrap();

        volume.set(7);
        assert!(entity.is_modified());
        assert_eq!(rec.count(), 0);
        assert_eq!(exec.run_pending(), 1);
        assert_eq!(rec.payloads(), vec!["settings"]);
    }
}
