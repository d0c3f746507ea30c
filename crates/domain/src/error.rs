//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! Adapter crates wrap protocol-native failures behind
//! [`UnihubError::Protocol`] at the port boundary; nothing in this taxonomy
//! is fatal to the host process.

/// Workspace-wide error enum covering the full failure taxonomy:
/// validation, not-found, connection, command, configuration, and
/// queue-capacity errors.
#[derive(Debug, thiserror::Error)]
pub enum UnihubError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A lookup by id found nothing.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// Transport-level failure; triggers the owning adapter's reconnect.
    #[error("connection error: {0}")]
    Connection(String),

    /// A native write was rejected or timed out. Reported to the caller,
    /// never retried automatically.
    #[error("command failed: {0}")]
    Command(String),

    /// Invalid adapter configuration, raised at construction time.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The command queue is at capacity; the enqueue was rejected.
    #[error("command queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The command was discarded by [`clear_queue`] before dispatch.
    #[error("queue cleared before dispatch")]
    QueueCleared,

    /// The policy gate denied the command.
    #[error("denied by policy: {reason}")]
    PolicyDenied { reason: String },

    /// The policy gate requires explicit confirmation; the command was not
    /// executed.
    #[error("confirmation required: {reason}")]
    ConfirmationRequired { reason: String },

    /// Protocol-native failure wrapped at an adapter boundary.
    #[error("protocol error")]
    Protocol(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required name field is empty.
    #[error("name must not be empty")]
    EmptyName,

    /// A device declared two capabilities of the same type.
    #[error("duplicate capability type: {0}")]
    DuplicateCapability(&'static str),

    /// A capability state variant does not match its declared type.
    #[error("capability state does not match type {0}")]
    CapabilityStateMismatch(&'static str),

    /// A required identifier field is empty.
    #[error("{0} must not be empty")]
    EmptyId(&'static str),

    /// A numeric value is outside its allowed range.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

/// A lookup by id found nothing.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    /// Kind of entity ("Device", "Area", "Scene", "Adapter", …).
    pub entity: &'static str,
    /// The id that missed.
    pub id: String,
}

impl NotFoundError {
    /// Shorthand constructor.
    #[must_use]
    pub fn new(entity: &'static str, id: impl Into<String>) -> Self {
        Self {
            entity,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_with_entity_and_id() {
        let err = NotFoundError::new("Device", "zigbee-0x1234");
        assert_eq!(err.to_string(), "Device not found: zigbee-0x1234");
    }

    #[test]
    fn should_convert_validation_error_via_from() {
        let err: UnihubError = ValidationError::EmptyName.into();
        assert!(matches!(
            err,
            UnihubError::Validation(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn should_display_queue_full_with_capacity() {
        let err = UnihubError::QueueFull { capacity: 1000 };
        assert_eq!(err.to_string(), "command queue full (capacity 1000)");
    }

    #[test]
    fn should_display_policy_denial_reason() {
        let err = UnihubError::PolicyDenied {
            reason: "quiet hours".to_string(),
        };
        assert_eq!(err.to_string(), "denied by policy: quiet hours");
    }
}
