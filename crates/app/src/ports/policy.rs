//! Policy gate port — external allow/deny/confirm verdicts.
//!
//! The manager consults the gate before every device-command execution; it
//! never implements the policy itself. A `Deny` verdict is surfaced as
//! [`UnihubError::PolicyDenied`]; `RequireConfirmation` is surfaced as
//! [`UnihubError::ConfirmationRequired`] without executing the command.
//!
//! [`UnihubError::PolicyDenied`]: unihub_domain::error::UnihubError::PolicyDenied
//! [`UnihubError::ConfirmationRequired`]: unihub_domain::error::UnihubError::ConfirmationRequired

use async_trait::async_trait;

use unihub_domain::command::DeviceCommand;
use unihub_domain::device::Device;

/// The three possible gate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny,
    RequireConfirmation,
}

/// Verdict for a proposed command against a target device.
#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub decision: PolicyDecision,
    pub reason: Option<String>,
}

impl PolicyVerdict {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            decision: PolicyDecision::Allow,
            reason: None,
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: PolicyDecision::Deny,
            reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn require_confirmation(reason: impl Into<String>) -> Self {
        Self {
            decision: PolicyDecision::RequireConfirmation,
            reason: Some(reason.into()),
        }
    }
}

/// External collaborator deciding whether a command may run.
#[async_trait]
pub trait PolicyGate: Send + Sync {
    async fn evaluate(&self, command: &DeviceCommand, device: &Device) -> PolicyVerdict;
}

/// Gate that allows everything; the default when no policy engine is wired.
pub struct AllowAll;

#[async_trait]
impl PolicyGate for AllowAll {
    async fn evaluate(&self, _command: &DeviceCommand, _device: &Device) -> PolicyVerdict {
        PolicyVerdict::allow()
    }
}
