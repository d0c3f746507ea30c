//! Device group — an ordered set of member devices used only for fan-out.

use serde::{Deserialize, Serialize};

use crate::error::{UnihubError, ValidationError};
use crate::id::{DeviceId, GroupId};

/// A named, ordered set of device ids. Carries no independent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGroup {
    pub id: GroupId,
    pub name: String,
    pub device_ids: Vec<DeviceId>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DeviceGroup {
    /// Construct a group, deduplicating member ids while preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Validation`] when `name` is empty.
    pub fn new(
        id: impl Into<GroupId>,
        name: impl Into<String>,
        device_ids: Vec<DeviceId>,
    ) -> Result<Self, UnihubError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let mut deduped: Vec<DeviceId> = Vec::with_capacity(device_ids.len());
        for id in device_ids {
            if !deduped.contains(&id) {
                deduped.push(id);
            }
        }
        Ok(Self {
            id: id.into(),
            name,
            device_ids: deduped,
            tags: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_preserve_member_order_and_dedupe() {
        let group = DeviceGroup::new(
            "downstairs",
            "Downstairs Lights",
            vec![
                DeviceId::new("a"),
                DeviceId::new("b"),
                DeviceId::new("a"),
                DeviceId::new("c"),
            ],
        )
        .unwrap();
        let ids: Vec<&str> = group.device_ids.iter().map(DeviceId::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn should_reject_group_without_name() {
        let result = DeviceGroup::new("g", "", vec![]);
        assert!(matches!(result, Err(UnihubError::Validation(_))));
    }
}
