//! Port definitions — traits that adapters and external collaborators
//! implement.
//!
//! Ports are the boundaries between the application core and the outside
//! world. They are defined here (in `app`) so that both the manager and the
//! adapter crates can depend on them without creating circular dependencies.

pub mod adapter;
pub mod policy;

pub use adapter::DeviceAdapter;
pub use policy::{PolicyDecision, PolicyGate, PolicyVerdict};
