//! # unihub-app
//!
//! Application layer — the entity graph, port definitions, and the adapter
//! manager that routes canonical commands to protocol adapters.
//!
//! ## Responsibilities
//! - **Entity graph**: canonical, adapter-agnostic lookup and fuzzy search
//!   over areas, devices, scenes, and groups, with synchronous state-change
//!   fan-out
//! - **Ports** (traits adapters and collaborators implement):
//!   - [`ports::adapter::DeviceAdapter`] — the lifecycle and command contract
//!     every protocol integration satisfies
//!   - [`ports::policy::PolicyGate`] — external allow/deny/confirm verdicts
//! - **Adapter scaffolding**: the reconnect/backoff state machine and the
//!   shared [`adapter_core::AdapterCore`] (status, events, connection
//!   transitions) adapters embed
//! - **Adapter manager**: registry, concurrent discovery aggregation, and a
//!   throttled priority-ordered command queue
//!
//! ## Dependency rule
//! Depends on `unihub-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod adapter_core;
pub mod event_bus;
pub mod filter;
pub mod graph;
pub mod manager;
pub mod ports;
pub mod reconnect;
