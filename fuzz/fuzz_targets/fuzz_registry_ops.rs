#![no_main]

use std::sync::{Arc, Mutex};

use arbitrary::Arbitrary;
use ctrack_core::{Dispatch, ListenerRef, Registry};
use ctrack_harness::ManualQueue;
use libfuzzer_sys::fuzz_target;

const SLOTS: usize = 8;

#[derive(Arbitrary, Debug)]
enum RegistryOp {
    Register { slot: u8, deferred: bool },
    RegisterFirst { slot: u8, deferred: bool },
    Unregister { slot: u8 },
    /// A listener that unregisters `victim` from inside the fan-out.
    RegisterKiller { victim: u8 },
    Notify(u16),
    RunPending,
    Clear,
}

fuzz_target!(|ops: Vec<RegistryOp>| {
    let exec = Arc::new(ManualQueue::new());
    let registry: Registry<u16> = Registry::new(exec.clone());
    let seen = Arc::new(Mutex::new(0usize));
    let handles: Vec<ListenerRef<u16>> = (0..SLOTS)
        .map(|_| {
            let seen = Arc::clone(&seen);
            ListenerRef::from_fn(move |_, _: &u16| *seen.lock().unwrap() += 1)
        })
        .collect();

    for op in ops.into_iter().take(512) {
        match op {
            RegistryOp::Register { slot, deferred } => {
                let h = handles[slot as usize % SLOTS].clone();
                registry.register(h, Dispatch::from_flag(deferred)).unwrap();
            }
            RegistryOp::RegisterFirst { slot, deferred } => {
                let h = handles[slot as usize % SLOTS].clone();
                registry
                    .register_first(h, Dispatch::from_flag(deferred))
                    .unwrap();
            }
            RegistryOp::Unregister { slot } => {
                let h = &handles[slot as usize % SLOTS];
                let present = registry.contains(h);
                assert_eq!(registry.unregister(h).is_ok(), present);
            }
            RegistryOp::RegisterKiller { victim } => {
                let victim = handles[victim as usize % SLOTS].clone();
                let killer = ListenerRef::from_fn(move |src: &Registry<u16>, _: &u16| {
                    let _ = src.unregister(&victim);
                });
                registry.register(killer, Dispatch::Immediate).unwrap();
            }
            RegistryOp::Notify(payload) => {
                let before = registry.stats().notifications;
                registry.notify(payload);
                assert_eq!(registry.stats().notifications, before + 1);
            }
            RegistryOp::RunPending => {
                exec.run_pending();
            }
            RegistryOp::Clear => registry.clear(),
        }
        assert_eq!(
            registry.len(),
            registry.immediate_len() + registry.deferred_len()
        );
    }
    exec.run_pending();
    assert_eq!(exec.pending(), 0);
    assert_eq!(registry.stats().listener_panics, 0);
});
