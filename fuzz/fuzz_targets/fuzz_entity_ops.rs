#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use ctrack_harness::ManualQueue;
use ctrack_runtime::{DirtyState, Property, TrackedEntity};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum EntityOp {
    SetLeaf(u8),
    SetChildLeaf(u8),
    Initialize,
    InitializeChild,
    Save,
    SaveChild,
    StopObservingChild,
    RunPending,
}

fuzz_target!(|ops: Vec<EntityOp>| {
    let exec = Arc::new(ManualQueue::new());
    let parent = TrackedEntity::new(exec.clone(), 0u8);
    let child = TrackedEntity::new(exec.clone(), 1u8);
    let leaf = Property::new(exec.clone(), 0u8);
    let child_leaf = Property::new(exec.clone(), 0u8);
    parent.observe(leaf.registry()).unwrap();
    parent.observe(child.registry()).unwrap();
    child.observe(child_leaf.registry()).unwrap();

    for op in ops.into_iter().take(512) {
        let parent_was_clean_init = parent.state() == DirtyState::CleanInitialized;
        let changed_leaf = match op {
            EntityOp::SetLeaf(v) => leaf.set(v),
            EntityOp::SetChildLeaf(v) => {
                let child_was_init = child.is_initialized();
                let changed = child_leaf.set(v);
                // A suppressed child must not reach the parent.
                changed && child_was_init && parent.is_observing(child.registry())
            }
            EntityOp::Initialize => {
                parent.mark_initialized();
                false
            }
            EntityOp::InitializeChild => {
                child.mark_initialized();
                false
            }
            EntityOp::Save => {
                parent.saved();
                false
            }
            EntityOp::SaveChild => {
                child.saved();
                false
            }
            EntityOp::StopObservingChild => {
                parent.stop_observing(child.registry());
                false
            }
            EntityOp::RunPending => {
                exec.run_pending();
                false
            }
        };
        if changed_leaf && parent_was_clean_init {
            assert!(parent.is_modified());
        }
        if parent.is_modified() {
            assert!(parent.is_initialized());
        }
        if child.is_modified() {
            assert!(child.is_initialized());
        }
    }
});
