//! Scene — a named preset owned by an adapter. Invoked, not queried for state.

use serde::{Deserialize, Serialize};

use crate::error::{UnihubError, ValidationError};
use crate::id::{AdapterId, SceneId};

/// A read-mostly, invokable preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub description: Option<String>,
    pub adapter_id: AdapterId,
    /// Opaque id used to round-trip the activation to the owning adapter.
    pub native_id: String,
}

impl Scene {
    /// Construct a scene with a [`SceneId::scoped`] id.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::Validation`] when `name` or `native_id` is
    /// empty.
    pub fn new(
        adapter_id: impl Into<AdapterId>,
        native_id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, UnihubError> {
        let adapter_id = adapter_id.into();
        let native_id = native_id.into();
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if native_id.is_empty() {
            return Err(ValidationError::EmptyId("native_id").into());
        }
        Ok(Self {
            id: SceneId::scoped(&adapter_id, &native_id),
            name,
            description,
            adapter_id,
            native_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_scene_with_scoped_id() {
        let scene = Scene::new("hubapi", "scene.movie_night", "Movie Night", None).unwrap();
        assert_eq!(scene.id.as_str(), "hubapi-scene.movie_night");
        assert_eq!(scene.adapter_id.as_str(), "hubapi");
    }

    #[test]
    fn should_reject_scene_without_name() {
        let result = Scene::new("hubapi", "scene.x", "", None);
        assert!(matches!(
            result,
            Err(UnihubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_reject_scene_without_native_id() {
        let result = Scene::new("hubapi", "", "Movie Night", None);
        assert!(matches!(result, Err(UnihubError::Validation(_))));
    }
}
