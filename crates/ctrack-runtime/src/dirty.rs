#![forbid(unsafe_code)]

//! Dirty-flag state machine.
//!
//! ```text
//!                 mark_initialized()            first change
//! CleanUninitialized ──────────────▶ CleanInitialized ──────────▶ Dirty
//!        │  ▲                               ▲                      │
//!        └──┘ changes suppressed            └──────── saved() ─────┘
//! ```
//!
//! [`DirtyGate`] holds the state in one atomic word and is installed as a
//! registry's [`BroadcastHook`]. It decides, per notification, whether the
//! notification reaches listeners:
//!
//! | state                | verdict    | transition          |
//! |----------------------|------------|---------------------|
//! | `CleanUninitialized` | `Suppress` | none                |
//! | `CleanInitialized`   | `Continue` | `→ Dirty` (counted) |
//! | `Dirty`              | `Continue` | none                |
//!
//! # Invariants
//!
//! 1. `modified` is exactly `state == Dirty`.
//! 2. `Dirty` implies initialized; `saved()` never un-initializes.
//! 3. The `CleanInitialized → Dirty` transition happens once per dirty period
//!    even when notifications race on several threads (compare-and-swap).

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use ctrack_core::{Broadcast, BroadcastHook};
use tracing::debug;

/// Dirty-tracking state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DirtyState {
    /// Still being constructed or loaded; changes are ignored.
    CleanUninitialized = 0,
    /// Fully constructed, no unsaved changes.
    CleanInitialized = 1,
    /// Unsaved changes exist.
    Dirty = 2,
}

impl DirtyState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::CleanUninitialized,
            1 => Self::CleanInitialized,
            _ => Self::Dirty,
        }
    }

    #[must_use]
    pub const fn is_modified(self) -> bool {
        matches!(self, Self::Dirty)
    }

    #[must_use]
    pub const fn is_initialized(self) -> bool {
        !matches!(self, Self::CleanUninitialized)
    }
}

/// Atomic dirty state plus its transition counter.
#[derive(Debug)]
pub struct DirtyGate {
    state: AtomicU8,
    transitions: AtomicU64,
    label: &'static str,
}

impl Default for DirtyGate {
    fn default() -> Self {
        Self::new("entity")
    }
}

impl DirtyGate {
    /// A gate in `CleanUninitialized`. `label` appears in log events.
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self {
            state: AtomicU8::new(DirtyState::CleanUninitialized as u8),
            transitions: AtomicU64::new(0),
            label,
        }
    }

    #[must_use]
    pub fn state(&self) -> DirtyState {
        DirtyState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.state().is_modified()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state().is_initialized()
    }

    /// Number of `CleanInitialized → Dirty` transitions so far.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// `CleanUninitialized → CleanInitialized`. Returns whether this call
    /// performed the transition.
    pub fn mark_initialized(&self) -> bool {
        let flipped = self
            .state
            .compare_exchange(
                DirtyState::CleanUninitialized as u8,
                DirtyState::CleanInitialized as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if flipped {
            debug!(entity = self.label, "entity.initialized");
        }
        flipped
    }

    /// `Dirty → CleanInitialized`. Returns whether the entity was dirty.
    pub fn saved(&self) -> bool {
        let cleaned = self
            .state
            .compare_exchange(
                DirtyState::Dirty as u8,
                DirtyState::CleanInitialized as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if cleaned {
            debug!(entity = self.label, "entity.saved");
        }
        cleaned
    }

    /// Apply one change notification and return the delivery verdict.
    pub fn on_change(&self) -> Broadcast {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match DirtyState::from_u8(current) {
                DirtyState::CleanUninitialized => return Broadcast::Suppress,
                DirtyState::Dirty => return Broadcast::Continue,
                DirtyState::CleanInitialized => match self.state.compare_exchange(
                    current,
                    DirtyState::Dirty as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.transitions.fetch_add(1, Ordering::Relaxed);
                        debug!(entity = self.label, "entity.dirty");
                        return Broadcast::Continue;
                    }
                    Err(actual) => current = actual,
                },
            }
        }
    }
}

impl<P> BroadcastHook<P> for DirtyGate {
    fn before_broadcast(&self, _payload: &P) -> Broadcast {
        self.on_change()
    }
}
