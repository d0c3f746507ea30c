//! # unihub-domain
//!
//! Canonical, protocol-agnostic model for the unihub command router.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Areas** (rooms, floors, zones — optionally hierarchical)
//! - Define **Devices** and their typed **Capabilities** (switch, dimmer, …)
//! - Define **Scenes** and **Device groups**
//! - Define **Commands** (the uniform write shape adapters translate)
//! - Define **Adapter status and events** (the shapes crossing the port)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod adapter;
pub mod area;
pub mod capability;
pub mod command;
pub mod device;
pub mod group;
pub mod scene;
