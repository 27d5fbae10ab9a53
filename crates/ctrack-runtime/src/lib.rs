#![forbid(unsafe_code)]

//! Runtime: change forwarding, dirty tracking, and observable properties.
//!
//! - [`ChangeForwarder`]: listener adapter that re-fires another registry.
//! - [`DirtyGate`] / [`DirtyState`]: the dirty-flag state machine, installed
//!   as a registry broadcast hook.
//! - [`TrackedEntity`]: an entity that tracks unsaved changes across the
//!   registries it observes.
//! - [`Property`]: a version-tracked value cell with its own registry.

pub mod dirty;
pub mod entity;
pub mod forwarder;
pub mod property;

pub use dirty::{DirtyGate, DirtyState};
pub use entity::{EntityConfig, TrackedEntity};
pub use forwarder::ChangeForwarder;
pub use property::Property;
