//! Clock access for the canonical model.
//!
//! Every timestamp in the model (`Device::last_updated`, queue enqueue
//! times, adapter status marks) is UTC and captured through this module, so
//! the choice of clock lives in one place.

use chrono::{DateTime, Utc};

/// UTC instant attached to devices, events, and status snapshots.
/// Serializes as RFC 3339.
pub type Timestamp = DateTime<Utc>;

/// Current UTC instant.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
