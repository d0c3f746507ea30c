//! Entity graph — canonical, adapter-agnostic store of areas, devices,
//! scenes, and groups, with fuzzy name resolution and synchronous
//! state-change fan-out.
//!
//! One writer role mutates the graph (the owning adapter via state-change
//! updates, or the manager during discovery aggregation); many readers.
//! Listener delivery is synchronous: a listener that blocks will stall the
//! emitting adapter's event loop, and a listener that mutates the graph
//! re-enters this component — keep listeners short.

pub mod search;

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::RwLock;

use unihub_domain::area::Area;
use unihub_domain::capability::{CapabilityState, CapabilityType};
use unihub_domain::device::Device;
use unihub_domain::error::{NotFoundError, UnihubError, ValidationError};
use unihub_domain::group::DeviceGroup;
use unihub_domain::id::{AdapterId, AreaId, DeviceId, GroupId, SceneId};
use unihub_domain::scene::Scene;
use unihub_domain::time::Timestamp;

/// Payload delivered to state-change listeners.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub capability: CapabilityType,
    pub old_state: Option<CapabilityState>,
    pub new_state: CapabilityState,
    pub timestamp: Timestamp,
}

/// Synchronous state-change observer.
pub type StateListener = Box<dyn Fn(&StateChange) + Send + Sync>;

/// Grouping key used by hierarchical area queries when an area has neither
/// a parent nor a floor.
pub const UNASSIGNED_GROUP: &str = "unassigned";

struct DeviceEntry {
    device: Device,
    /// Insertion order, used as the fuzzy-search tie breaker.
    seq: u64,
}

#[derive(Default)]
struct GraphInner {
    devices: HashMap<DeviceId, DeviceEntry>,
    areas: HashMap<AreaId, Area>,
    scenes: HashMap<SceneId, Scene>,
    groups: HashMap<GroupId, DeviceGroup>,
    next_seq: u64,
}

/// In-memory entity store. One instance per process, passed explicitly to
/// collaborators.
#[derive(Default)]
pub struct EntityGraph {
    inner: RwLock<GraphInner>,
    listeners: RwLock<Vec<StateListener>>,
}

impl EntityGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert keyed by id; last writer wins, no merge.
    ///
    /// A device with zero capabilities is **not** added (absence of
    /// capabilities signals an unsupported device, not an error).
    /// Returns whether the device was stored.
    pub fn set_device(&self, device: Device) -> bool {
        if device.capabilities.is_empty() {
            tracing::debug!(device_id = %device.id, "dropping device with no mapped capabilities");
            return false;
        }
        let mut inner = self.inner.write().expect("graph lock poisoned");
        let seq = match inner.devices.get(&device.id) {
            Some(existing) => existing.seq,
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                seq
            }
        };
        inner.devices.insert(device.id.clone(), DeviceEntry { device, seq });
        true
    }

    /// Idempotent area upsert; last writer wins.
    pub fn set_area(&self, area: Area) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.areas.insert(area.id.clone(), area);
    }

    /// Idempotent scene upsert; last writer wins.
    pub fn set_scene(&self, scene: Scene) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.scenes.insert(scene.id.clone(), scene);
    }

    /// Idempotent group upsert; last writer wins.
    pub fn set_group(&self, group: DeviceGroup) {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.groups.insert(group.id.clone(), group);
    }

    /// Lookup by id. `None` is the explicit not-found signal.
    #[must_use]
    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.devices.get(id).map(|e| e.device.clone())
    }

    #[must_use]
    pub fn area(&self, id: &AreaId) -> Option<Area> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.areas.get(id).cloned()
    }

    #[must_use]
    pub fn scene(&self, id: &SceneId) -> Option<Scene> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.scenes.get(id).cloned()
    }

    #[must_use]
    pub fn group(&self, id: &GroupId) -> Option<DeviceGroup> {
        let inner = self.inner.read().expect("graph lock poisoned");
        inner.groups.get(id).cloned()
    }

    /// All devices in insertion order.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut entries: Vec<(&u64, &Device)> = inner
            .devices
            .values()
            .map(|e| (&e.seq, &e.device))
            .collect();
        entries.sort_by_key(|(seq, _)| **seq);
        entries.into_iter().map(|(_, d)| d.clone()).collect()
    }

    #[must_use]
    pub fn areas(&self) -> Vec<Area> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut areas: Vec<Area> = inner.areas.values().cloned().collect();
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        areas
    }

    #[must_use]
    pub fn scenes(&self) -> Vec<Scene> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut scenes: Vec<Scene> = inner.scenes.values().cloned().collect();
        scenes.sort_by(|a, b| a.name.cmp(&b.name));
        scenes
    }

    #[must_use]
    pub fn groups(&self) -> Vec<DeviceGroup> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut groups: Vec<DeviceGroup> = inner.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    /// Devices owned by the given adapter, in insertion order.
    #[must_use]
    pub fn devices_for_adapter(&self, adapter_id: &AdapterId) -> Vec<Device> {
        self.devices()
            .into_iter()
            .filter(|d| &d.adapter_id == adapter_id)
            .collect()
    }

    /// Drop every device owned by the given adapter (used on unregister).
    /// Returns how many were removed.
    pub fn remove_adapter_devices(&self, adapter_id: &AdapterId) -> usize {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        let before = inner.devices.len();
        inner.devices.retain(|_, e| &e.device.adapter_id != adapter_id);
        before - inner.devices.len()
    }

    /// Remove a single device by id.
    pub fn remove_device(&self, id: &DeviceId) -> Option<Device> {
        let mut inner = self.inner.write().expect("graph lock poisoned");
        inner.devices.remove(id).map(|e| e.device)
    }

    /// Fuzzy device lookup. See [`search::score_device`] for the scoring
    /// ladder; zero-scoring devices are excluded, results sorted by score
    /// descending with ties broken by insertion order, truncated to
    /// `max_results`.
    #[must_use]
    pub fn find_devices_by_name(&self, query: &str, max_results: usize) -> Vec<Device> {
        let query = query.to_lowercase();
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut scored: Vec<(u32, u64, &Device)> = inner
            .devices
            .values()
            .filter_map(|entry| {
                let score = search::score_device(&entry.device, &query);
                (score > 0).then_some((score, entry.seq, &entry.device))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(max_results)
            .map(|(_, _, d)| d.clone())
            .collect()
    }

    /// Replace the state of one capability and notify listeners.
    ///
    /// Listeners run synchronously with the write lock already released; a
    /// panicking listener is logged and skipped without affecting the rest.
    ///
    /// # Errors
    ///
    /// Returns [`UnihubError::NotFound`] for an unknown device or a
    /// capability the device does not expose, and [`UnihubError::Validation`]
    /// when the state variant does not match the capability type.
    pub fn update_device_state(
        &self,
        device_id: &DeviceId,
        capability: CapabilityType,
        new_state: CapabilityState,
    ) -> Result<(), UnihubError> {
        if !new_state.matches(capability) {
            return Err(ValidationError::CapabilityStateMismatch(capability.as_str()).into());
        }

        let change = {
            let mut inner = self.inner.write().expect("graph lock poisoned");
            let entry = inner
                .devices
                .get_mut(device_id)
                .ok_or_else(|| NotFoundError::new("Device", device_id.as_str()))?;
            let device = &mut entry.device;
            let now = unihub_domain::time::now();
            let cap = device
                .capability_mut(capability)
                .ok_or_else(|| NotFoundError::new("Capability", capability.as_str()))?;
            let old_state = cap.state.replace(new_state.clone());
            device.last_updated = now;
            StateChange {
                device_id: device_id.clone(),
                capability,
                old_state,
                new_state,
                timestamp: now,
            }
        };

        self.notify(&change);
        Ok(())
    }

    /// Register a synchronous state-change listener.
    pub fn add_state_listener(&self, listener: StateListener) {
        let mut listeners = self.listeners.write().expect("listener lock poisoned");
        listeners.push(listener);
    }

    fn notify(&self, change: &StateChange) {
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for listener in listeners.iter() {
            // catch-and-continue: one broken listener must not starve the rest
            if catch_unwind(AssertUnwindSafe(|| listener(change))).is_err() {
                tracing::warn!(
                    device_id = %change.device_id,
                    "state-change listener panicked; continuing with remaining listeners"
                );
            }
        }
    }

    /// Areas grouped under the given key: children by `parent_area_id`,
    /// falling back to `floor` for areas without a parent.
    #[must_use]
    pub fn child_areas(&self, parent: &str) -> Vec<Area> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut areas: Vec<Area> = inner
            .areas
            .values()
            .filter(|a| grouping_key(a) == parent)
            .cloned()
            .collect();
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        areas
    }

    /// All areas bucketed by their grouping key (`parent_area_id`, else
    /// `floor`, else [`UNASSIGNED_GROUP`]).
    #[must_use]
    pub fn hierarchical_areas(&self) -> BTreeMap<String, Vec<Area>> {
        let inner = self.inner.read().expect("graph lock poisoned");
        let mut buckets: BTreeMap<String, Vec<Area>> = BTreeMap::new();
        for area in inner.areas.values() {
            buckets
                .entry(grouping_key(area).to_string())
                .or_default()
                .push(area.clone());
        }
        for areas in buckets.values_mut() {
            areas.sort_by(|a, b| a.name.cmp(&b.name));
        }
        buckets
    }
}

fn grouping_key(area: &Area) -> &str {
    area.parent_area_id
        .as_ref()
        .map(AreaId::as_str)
        .or(area.floor.as_deref())
        .unwrap_or(UNASSIGNED_GROUP)
}
