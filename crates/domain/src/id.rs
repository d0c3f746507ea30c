//! Typed identifier newtypes.
//!
//! Entity identifiers are string-backed rather than UUID-backed: devices,
//! areas, and scenes are addressed by identifiers minted by their owning
//! adapter, typically `{adapter_id}-{native_id}`.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Access the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an [`Adapter`](crate::adapter) instance.
    AdapterId
);

define_id!(
    /// Unique identifier for a [`Device`](crate::device::Device).
    DeviceId
);

define_id!(
    /// Unique identifier for an [`Area`](crate::area::Area).
    AreaId
);

define_id!(
    /// Unique identifier for a [`Scene`](crate::scene::Scene).
    SceneId
);

define_id!(
    /// Unique identifier for a [`DeviceGroup`](crate::group::DeviceGroup).
    GroupId
);

impl DeviceId {
    /// Build the canonical globally-unique device id from the owning
    /// adapter and the adapter's native id: `{adapter_id}-{native_id}`.
    #[must_use]
    pub fn scoped(adapter_id: &AdapterId, native_id: &str) -> Self {
        Self(format!("{adapter_id}-{native_id}"))
    }
}

impl SceneId {
    /// Build the canonical globally-unique scene id from the owning
    /// adapter and the adapter's native id.
    #[must_use]
    pub fn scoped(adapter_id: &AdapterId, native_id: &str) -> Self {
        Self(format!("{adapter_id}-{native_id}"))
    }
}

/// Correlation id for a queued command ticket, minted by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(uuid::Uuid);

impl Default for TicketId {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl TicketId {
    /// Generate a new random ticket id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
