//! Area — a logical grouping (room, floor, zone) for devices.

use serde::{Deserialize, Serialize};

use crate::error::{UnihubError, ValidationError};
use crate::id::AreaId;

/// A logical grouping such as a room, floor, or zone.
///
/// Areas may be hierarchical via `parent_area_id`; areas without a parent
/// can still be grouped by their `floor` label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    pub floor: Option<String>,
    pub parent_area_id: Option<AreaId>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Area {
    /// Create a builder for constructing an [`Area`].
    #[must_use]
    pub fn builder() -> AreaBuilder {
        AreaBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Validation`] when `name` is empty.
    pub fn validate(&self) -> Result<(), UnihubError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Area`].
#[derive(Debug, Default)]
pub struct AreaBuilder {
    id: Option<AreaId>,
    name: Option<String>,
    floor: Option<String>,
    parent_area_id: Option<AreaId>,
    aliases: Vec<String>,
    tags: Vec<String>,
}

impl AreaBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<AreaId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn floor(mut self, floor: impl Into<String>) -> Self {
        self.floor = Some(floor.into());
        self
    }

    #[must_use]
    pub fn parent_area_id(mut self, parent: impl Into<AreaId>) -> Self {
        self.parent_area_id = Some(parent.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Consume the builder, validate, and return an [`Area`].
    ///
    /// The id defaults to the snake_cased name when not set explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Validation`] if `name` is missing or empty.
    pub fn build(self) -> Result<Area, UnihubError> {
        let name = self.name.unwrap_or_default();
        let id = self
            .id
            .unwrap_or_else(|| AreaId::new(name.to_lowercase().replace(' ', "_")));
        let area = Area {
            id,
            name,
            floor: self.floor,
            parent_area_id: self.parent_area_id,
            aliases: self.aliases,
            tags: self.tags,
        };
        area.validate()?;
        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_valid_area_when_name_provided() {
        let area = Area::builder().name("Living Room").build().unwrap();
        assert_eq!(area.name, "Living Room");
        assert_eq!(area.id.as_str(), "living_room");
        assert!(area.parent_area_id.is_none());
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Area::builder().build();
        assert!(matches!(
            result,
            Err(UnihubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_build_area_with_parent_and_floor() {
        let area = Area::builder()
            .name("Bedroom")
            .floor("upstairs")
            .parent_area_id("house")
            .build()
            .unwrap();

        assert_eq!(area.parent_area_id, Some(AreaId::new("house")));
        assert_eq!(area.floor.as_deref(), Some("upstairs"));
    }

    #[test]
    fn should_collect_aliases_and_tags() {
        let area = Area::builder()
            .name("Kitchen")
            .alias("cuisine")
            .tag("downstairs")
            .build()
            .unwrap();
        assert_eq!(area.aliases, vec!["cuisine"]);
        assert_eq!(area.tags, vec!["downstairs"]);
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let area = Area::builder().name("Kitchen").build().unwrap();
        let json = serde_json::to_string(&area).unwrap();
        let parsed: Area = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, area.id);
        assert_eq!(parsed.name, area.name);
    }
}
