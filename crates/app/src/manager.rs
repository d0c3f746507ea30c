//! Adapter manager — registry, discovery aggregation, and command dispatch.
//!
//! Routing is always to the single adapter owning the target device; the
//! registration `priority` is informational tie-breaking in status output
//! only. Direct execution bypasses the queue entirely; queued execution goes
//! through one serialized drain loop with priority ordering and throttling.
//! The two paths share no ordering relationship — callers needing strict
//! global order must route everything through the queue.

pub mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use unihub_domain::adapter::AdapterStatus;
use unihub_domain::area::Area;
use unihub_domain::command::{DeviceCommand, SceneCommand};
use unihub_domain::device::Device;
use unihub_domain::error::{NotFoundError, UnihubError};
use unihub_domain::id::AdapterId;
use unihub_domain::scene::Scene;

use crate::graph::EntityGraph;
use crate::ports::adapter::DeviceAdapter;
use crate::ports::policy::{PolicyDecision, PolicyGate};
use queue::{CommandQueue, CommandTicket, QueuedKind};

/// Queue and throttle tuning.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Enqueues beyond this are rejected synchronously.
    pub max_queue_size: usize,
    /// Minimum spacing between successive queued dispatches.
    pub command_throttle_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            command_throttle_delay: Duration::from_millis(100),
        }
    }
}

/// One row of informational status output.
#[derive(Debug, Clone)]
pub struct AdapterStatusReport {
    pub adapter_id: AdapterId,
    pub priority: i32,
    pub status: AdapterStatus,
}

struct Registered {
    adapter: Arc<dyn DeviceAdapter>,
    priority: i32,
    health_task: JoinHandle<()>,
}

struct ManagerInner {
    graph: Arc<EntityGraph>,
    policy: Arc<dyn PolicyGate>,
    adapters: RwLock<HashMap<AdapterId, Registered>>,
    queue: CommandQueue,
    queue_signal: Notify,
    draining: AtomicBool,
    last_dispatch: Mutex<Option<Instant>>,
    throttle_delay: Duration,
}

/// Registry of adapters plus the one serialization point for queued
/// commands. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct AdapterManager {
    inner: Arc<ManagerInner>,
    drain_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AdapterManager {
    /// Create a manager with default tuning and spawn its drain loop.
    #[must_use]
    pub fn new(graph: Arc<EntityGraph>, policy: Arc<dyn PolicyGate>) -> Self {
        Self::with_config(graph, policy, ManagerConfig::default())
    }

    /// Create a manager with explicit tuning and spawn its drain loop.
    #[must_use]
    pub fn with_config(
        graph: Arc<EntityGraph>,
        policy: Arc<dyn PolicyGate>,
        config: ManagerConfig,
    ) -> Self {
        let inner = Arc::new(ManagerInner {
            graph,
            policy,
            adapters: RwLock::new(HashMap::new()),
            queue: CommandQueue::new(config.max_queue_size),
            queue_signal: Notify::new(),
            draining: AtomicBool::new(false),
            last_dispatch: Mutex::new(None),
            throttle_delay: config.command_throttle_delay,
        });

        let drain_inner = Arc::clone(&inner);
        let drain_task = tokio::spawn(async move {
            loop {
                let notified = drain_inner.queue_signal.notified();
                drain_inner.drain_pending().await;
                notified.await;
            }
        });

        Self {
            inner,
            drain_task: Arc::new(Mutex::new(Some(drain_task))),
        }
    }

    /// The shared entity graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<EntityGraph> {
        &self.inner.graph
    }

    /// Register an adapter and start its scheduled health check.
    ///
    /// `priority` is an opaque integer used only for tie-breaking in
    /// [`adapter_statuses`](Self::adapter_statuses); it does not affect
    /// routing.
    pub fn register_adapter(&self, adapter: Arc<dyn DeviceAdapter>, priority: i32) {
        let id = adapter.id().clone();
        let health_task = spawn_health_loop(Arc::clone(&adapter));
        let mut adapters = self.inner.adapters.write().expect("registry lock poisoned");
        if let Some(previous) = adapters.insert(
            id.clone(),
            Registered {
                adapter,
                priority,
                health_task,
            },
        ) {
            previous.health_task.abort();
        }
        tracing::info!(adapter_id = %id, priority, "adapter registered");
    }

    /// Unregister an adapter: stops its health loop and drops its devices
    /// from the graph. Returns whether it was registered.
    pub fn unregister_adapter(&self, id: &AdapterId) -> bool {
        let removed = {
            let mut adapters = self.inner.adapters.write().expect("registry lock poisoned");
            adapters.remove(id)
        };
        match removed {
            Some(registered) => {
                registered.health_task.abort();
                let dropped = self.inner.graph.remove_adapter_devices(id);
                tracing::info!(adapter_id = %id, dropped, "adapter unregistered");
                true
            }
            None => false,
        }
    }

    /// Informational status for every registered adapter, sorted by
    /// priority descending, id ascending.
    #[must_use]
    pub fn adapter_statuses(&self) -> Vec<AdapterStatusReport> {
        let adapters = self.inner.adapters.read().expect("registry lock poisoned");
        let mut reports: Vec<AdapterStatusReport> = adapters
            .iter()
            .map(|(id, registered)| AdapterStatusReport {
                adapter_id: id.clone(),
                priority: registered.priority,
                status: registered.adapter.status(),
            })
            .collect();
        reports.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.adapter_id.cmp(&b.adapter_id))
        });
        reports
    }

    /// Discover devices on every adapter concurrently and upsert them into
    /// the graph. One failing adapter contributes an empty list; the others
    /// are unaffected.
    pub async fn discover_all_devices(&self) -> Vec<Device> {
        let adapters = self.inner.adapter_snapshot();
        let results = join_all(adapters.iter().map(|adapter| async move {
            match adapter.discover_devices().await {
                Ok(devices) => devices,
                Err(err) => {
                    tracing::warn!(adapter_id = %adapter.id(), error = %err, "device discovery failed");
                    Vec::new()
                }
            }
        }))
        .await;

        let mut aggregated = Vec::new();
        for device in results.into_iter().flatten() {
            if self.inner.graph.set_device(device.clone()) {
                aggregated.push(device);
            }
        }
        aggregated
    }

    /// Discover scenes on every adapter concurrently; failures are isolated.
    pub async fn discover_all_scenes(&self) -> Vec<Scene> {
        let adapters = self.inner.adapter_snapshot();
        let results = join_all(adapters.iter().map(|adapter| async move {
            match adapter.discover_scenes().await {
                Ok(scenes) => scenes,
                Err(err) => {
                    tracing::warn!(adapter_id = %adapter.id(), error = %err, "scene discovery failed");
                    Vec::new()
                }
            }
        }))
        .await;

        let aggregated: Vec<Scene> = results.into_iter().flatten().collect();
        for scene in &aggregated {
            self.inner.graph.set_scene(scene.clone());
        }
        aggregated
    }

    /// Discover areas on every adapter concurrently; failures are isolated.
    pub async fn discover_all_areas(&self) -> Vec<Area> {
        let adapters = self.inner.adapter_snapshot();
        let results = join_all(adapters.iter().map(|adapter| async move {
            match adapter.discover_areas().await {
                Ok(areas) => areas,
                Err(err) => {
                    tracing::warn!(adapter_id = %adapter.id(), error = %err, "area discovery failed");
                    Vec::new()
                }
            }
        }))
        .await;

        let aggregated: Vec<Area> = results.into_iter().flatten().collect();
        for area in &aggregated {
            self.inner.graph.set_area(area.clone());
        }
        aggregated
    }

    /// Direct execution: policy gate, then the owning adapter, immediately.
    /// No queueing, no throttling, no ordering relative to queued commands.
    ///
    /// # Errors
    ///
    /// [`UnihubError::NotFound`] for an unknown device or adapter,
    /// [`UnihubError::PolicyDenied`] / [`UnihubError::ConfirmationRequired`]
    /// per the gate verdict, or the adapter's command failure.
    #[tracing::instrument(skip(self, command), fields(device_id = %command.device_id, action = %command.action))]
    pub async fn execute_device_command(&self, command: &DeviceCommand) -> Result<(), UnihubError> {
        self.inner.dispatch_device(command).await
    }

    /// Direct scene activation via the owning adapter.
    ///
    /// # Errors
    ///
    /// [`UnihubError::NotFound`] for an unknown scene or adapter, or the
    /// adapter's failure.
    #[tracing::instrument(skip(self, command), fields(scene_id = %command.scene_id))]
    pub async fn execute_scene_command(&self, command: &SceneCommand) -> Result<(), UnihubError> {
        self.inner.dispatch_scene(command).await
    }

    /// Enqueue a device command for throttled, priority-ordered dispatch.
    /// Rejects synchronously when the queue is at capacity.
    ///
    /// # Errors
    ///
    /// [`UnihubError::NotFound`] when the target device is unknown, or
    /// [`UnihubError::QueueFull`].
    pub fn queue_device_command(
        &self,
        command: DeviceCommand,
        priority: i32,
    ) -> Result<CommandTicket, UnihubError> {
        let device = self
            .inner
            .graph
            .device(&command.device_id)
            .ok_or_else(|| NotFoundError::new("Device", command.device_id.as_str()))?;
        let ticket =
            self.inner
                .queue
                .push(QueuedKind::Device(command), device.adapter_id, priority)?;
        self.inner.queue_signal.notify_one();
        Ok(ticket)
    }

    /// Enqueue a scene command for throttled, priority-ordered dispatch.
    ///
    /// # Errors
    ///
    /// [`UnihubError::NotFound`] when the scene is unknown, or
    /// [`UnihubError::QueueFull`].
    pub fn queue_scene_command(
        &self,
        command: SceneCommand,
        priority: i32,
    ) -> Result<CommandTicket, UnihubError> {
        let scene = self
            .inner
            .graph
            .scene(&command.scene_id)
            .ok_or_else(|| NotFoundError::new("Scene", command.scene_id.as_str()))?;
        let ticket =
            self.inner
                .queue
                .push(QueuedKind::Scene(command), scene.adapter_id, priority)?;
        self.inner.queue_signal.notify_one();
        Ok(ticket)
    }

    /// Synchronously reject every queued (not-yet-dispatched) item with a
    /// queue-cleared failure. In-flight commands are unaffected. Returns
    /// how many items were rejected.
    pub fn clear_queue(&self) -> usize {
        self.inner.queue.clear()
    }

    /// Current number of queued items.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Fire all commands concurrently via direct execution. Individual
    /// failures are logged, never propagated; resolves once every attempt
    /// has settled.
    pub async fn execute_bulk_device_commands(
        &self,
        commands: Vec<DeviceCommand>,
    ) -> Vec<(DeviceCommand, Result<(), UnihubError>)> {
        let results = join_all(commands.into_iter().map(|command| async move {
            let result = self.inner.dispatch_device(&command).await;
            if let Err(err) = &result {
                tracing::warn!(device_id = %command.device_id, error = %err, "bulk command failed");
            }
            (command, result)
        }))
        .await;
        results
    }

    /// Scene counterpart of
    /// [`execute_bulk_device_commands`](Self::execute_bulk_device_commands).
    pub async fn execute_bulk_scene_commands(
        &self,
        commands: Vec<SceneCommand>,
    ) -> Vec<(SceneCommand, Result<(), UnihubError>)> {
        let results = join_all(commands.into_iter().map(|command| async move {
            let result = self.inner.dispatch_scene(&command).await;
            if let Err(err) = &result {
                tracing::warn!(scene_id = %command.scene_id, error = %err, "bulk scene failed");
            }
            (command, result)
        }))
        .await;
        results
    }

    /// Stop the drain loop and health loops, fail pending queue items, and
    /// shut every adapter down.
    pub async fn shutdown(&self) {
        if let Some(task) = self
            .drain_task
            .lock()
            .expect("drain task lock poisoned")
            .take()
        {
            task.abort();
        }
        self.inner.queue.clear();

        let adapters: Vec<Arc<dyn DeviceAdapter>> = {
            let mut registry = self.inner.adapters.write().expect("registry lock poisoned");
            registry
                .drain()
                .map(|(_, registered)| {
                    registered.health_task.abort();
                    registered.adapter
                })
                .collect()
        };
        for adapter in adapters {
            if let Err(err) = adapter.shutdown().await {
                tracing::warn!(adapter_id = %adapter.id(), error = %err, "adapter shutdown failed");
            }
        }
    }
}

impl ManagerInner {
    fn adapter_snapshot(&self) -> Vec<Arc<dyn DeviceAdapter>> {
        let adapters = self.adapters.read().expect("registry lock poisoned");
        adapters
            .values()
            .map(|registered| Arc::clone(&registered.adapter))
            .collect()
    }

    fn adapter_by_id(&self, id: &AdapterId) -> Result<Arc<dyn DeviceAdapter>, UnihubError> {
        let adapters = self.adapters.read().expect("registry lock poisoned");
        adapters
            .get(id)
            .map(|registered| Arc::clone(&registered.adapter))
            .ok_or_else(|| NotFoundError::new("Adapter", id.as_str()).into())
    }

    async fn dispatch_device(&self, command: &DeviceCommand) -> Result<(), UnihubError> {
        let device = self
            .graph
            .device(&command.device_id)
            .ok_or_else(|| NotFoundError::new("Device", command.device_id.as_str()))?;

        let verdict = self.policy.evaluate(command, &device).await;
        match verdict.decision {
            PolicyDecision::Deny => {
                return Err(UnihubError::PolicyDenied {
                    reason: verdict.reason.unwrap_or_else(|| "denied".to_string()),
                });
            }
            PolicyDecision::RequireConfirmation => {
                return Err(UnihubError::ConfirmationRequired {
                    reason: verdict
                        .reason
                        .unwrap_or_else(|| "confirmation required".to_string()),
                });
            }
            PolicyDecision::Allow => {}
        }

        let adapter = self.adapter_by_id(&device.adapter_id)?;
        adapter.execute_command(command).await
    }

    async fn dispatch_scene(&self, command: &SceneCommand) -> Result<(), UnihubError> {
        let scene = self
            .graph
            .scene(&command.scene_id)
            .ok_or_else(|| NotFoundError::new("Scene", command.scene_id.as_str()))?;
        let adapter = self.adapter_by_id(&scene.adapter_id)?;
        adapter.execute_scene(command).await
    }

    /// Drain everything currently queued. Guarded against re-entrancy: the
    /// spawned loop is the sole caller, and the flag makes that explicit.
    async fn drain_pending(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }

        while let Some(item) = self.queue.take_next() {
            self.throttle().await;
            tracing::debug!(
                ticket = %item.ticket,
                adapter_id = %item.adapter_id,
                enqueued_at = %item.enqueued_at,
                "dispatching queued command"
            );
            let result = match &item.kind {
                QueuedKind::Device(command) => self.dispatch_device(command).await,
                QueuedKind::Scene(command) => self.dispatch_scene(command).await,
            };
            if let Err(err) = &result {
                tracing::warn!(ticket = %item.ticket, error = %err, "queued command failed");
            }
            // the caller may have dropped its ticket; that is fine
            let _ = item.responder.send(result);
        }

        self.draining.store(false, Ordering::SeqCst);
    }

    /// Sleep out the remainder of the throttle window since the previous
    /// dispatch, then stamp this one.
    async fn throttle(&self) {
        let wait = {
            let last = self.last_dispatch.lock().expect("throttle lock poisoned");
            last.map(|instant| self.throttle_delay.saturating_sub(instant.elapsed()))
                .unwrap_or(Duration::ZERO)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        let mut last = self.last_dispatch.lock().expect("throttle lock poisoned");
        *last = Some(Instant::now());
    }
}

fn spawn_health_loop(adapter: Arc<dyn DeviceAdapter>) -> JoinHandle<()> {
    let interval = adapter.health_check_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately; skip that first tick
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let was_connected = adapter.status().connected;
            let healthy = adapter.health_check().await;
            if !healthy && was_connected {
                tracing::warn!(adapter_id = %adapter.id(), "health check failed while connected; reconnecting");
                if let Err(err) = adapter.reconnect().await {
                    tracing::warn!(adapter_id = %adapter.id(), error = %err, "reconnect attempt failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::broadcast;
    use unihub_domain::adapter::AdapterEvent;
    use unihub_domain::capability::{Capability, CapabilityState, CapabilityType};
    use unihub_domain::device::DeviceType;
    use unihub_domain::id::DeviceId;

    use crate::ports::policy::{AllowAll, PolicyVerdict};

    struct FakeAdapter {
        id: AdapterId,
        devices: Vec<Device>,
        fail_discovery: bool,
        fail_commands: bool,
        executed: Arc<StdMutex<Vec<(String, Instant)>>>,
        events: broadcast::Sender<AdapterEvent>,
    }

    impl FakeAdapter {
        fn new(id: &str, devices: Vec<Device>) -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                id: AdapterId::new(id),
                devices,
                fail_discovery: false,
                fail_commands: false,
                executed: Arc::new(StdMutex::new(Vec::new())),
                events,
            })
        }

        fn failing_discovery(id: &str) -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                id: AdapterId::new(id),
                devices: Vec::new(),
                fail_discovery: true,
                fail_commands: false,
                executed: Arc::new(StdMutex::new(Vec::new())),
                events,
            })
        }

        fn failing_commands(id: &str, devices: Vec<Device>) -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                id: AdapterId::new(id),
                devices,
                fail_discovery: false,
                fail_commands: true,
                executed: Arc::new(StdMutex::new(Vec::new())),
                events,
            })
        }

        fn executed_actions(&self) -> Vec<String> {
            self.executed
                .lock()
                .unwrap()
                .iter()
                .map(|(action, _)| action.clone())
                .collect()
        }

        fn dispatch_instants(&self) -> Vec<Instant> {
            self.executed
                .lock()
                .unwrap()
                .iter()
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl DeviceAdapter for FakeAdapter {
        fn id(&self) -> &AdapterId {
            &self.id
        }

        fn status(&self) -> AdapterStatus {
            AdapterStatus {
                connected: true,
                healthy: true,
                ..AdapterStatus::default()
            }
        }

        fn events(&self) -> broadcast::Receiver<AdapterEvent> {
            self.events.subscribe()
        }

        async fn initialize(&self) -> Result<(), UnihubError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), UnihubError> {
            Ok(())
        }

        async fn discover_devices(&self) -> Result<Vec<Device>, UnihubError> {
            if self.fail_discovery {
                return Err(UnihubError::Connection("broker unreachable".into()));
            }
            Ok(self.devices.clone())
        }

        async fn get_device_state(&self, device_id: &DeviceId) -> Result<Device, UnihubError> {
            self.devices
                .iter()
                .find(|d| &d.id == device_id)
                .cloned()
                .ok_or_else(|| NotFoundError::new("Device", device_id.as_str()).into())
        }

        async fn execute_command(&self, command: &DeviceCommand) -> Result<(), UnihubError> {
            if self.fail_commands {
                return Err(UnihubError::Command("native write rejected".into()));
            }
            self.executed
                .lock()
                .unwrap()
                .push((command.action.clone(), Instant::now()));
            Ok(())
        }

        async fn reconnect(&self) -> Result<(), UnihubError> {
            Ok(())
        }
    }

    struct DenyGate;

    #[async_trait]
    impl PolicyGate for DenyGate {
        async fn evaluate(&self, _command: &DeviceCommand, _device: &Device) -> PolicyVerdict {
            PolicyVerdict::deny("quiet hours")
        }
    }

    struct ConfirmGate;

    #[async_trait]
    impl PolicyGate for ConfirmGate {
        async fn evaluate(&self, _command: &DeviceCommand, _device: &Device) -> PolicyVerdict {
            PolicyVerdict::require_confirmation("unlocking a door")
        }
    }

    fn switch_device(adapter: &str, native: &str, name: &str) -> Device {
        Device::builder()
            .name(name)
            .adapter_id(adapter)
            .native_id(native)
            .device_type(DeviceType::Switch)
            .capability(
                Capability::with_state(
                    CapabilityType::Switch,
                    CapabilityState::Switch { on: false },
                )
                .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn manager_with(
        policy: Arc<dyn PolicyGate>,
        config: ManagerConfig,
    ) -> (AdapterManager, Arc<FakeAdapter>) {
        let graph = Arc::new(EntityGraph::new());
        let adapter = FakeAdapter::new("mqtt", vec![switch_device("mqtt", "p1", "Plug")]);
        graph.set_device(switch_device("mqtt", "p1", "Plug"));
        let manager = AdapterManager::with_config(graph, policy, config);
        manager.register_adapter(adapter.clone(), 0);
        (manager, adapter)
    }

    fn turn_on() -> DeviceCommand {
        DeviceCommand::new("mqtt-p1", CapabilityType::Switch, "turn_on")
    }

    #[tokio::test]
    async fn should_route_direct_command_to_owning_adapter() {
        let (manager, adapter) = manager_with(Arc::new(AllowAll), ManagerConfig::default());
        manager.execute_device_command(&turn_on()).await.unwrap();
        assert_eq!(adapter.executed_actions(), vec!["turn_on"]);
    }

    #[tokio::test]
    async fn should_not_execute_denied_command() {
        let (manager, adapter) = manager_with(Arc::new(DenyGate), ManagerConfig::default());
        let result = manager.execute_device_command(&turn_on()).await;
        assert!(matches!(result, Err(UnihubError::PolicyDenied { .. })));
        assert!(adapter.executed_actions().is_empty());
    }

    #[tokio::test]
    async fn should_surface_confirmation_without_executing() {
        let (manager, adapter) = manager_with(Arc::new(ConfirmGate), ManagerConfig::default());
        let result = manager.execute_device_command(&turn_on()).await;
        assert!(matches!(
            result,
            Err(UnihubError::ConfirmationRequired { .. })
        ));
        assert!(adapter.executed_actions().is_empty());
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let (manager, _) = manager_with(Arc::new(AllowAll), ManagerConfig::default());
        let command = DeviceCommand::new("ghost", CapabilityType::Switch, "turn_on");
        let result = manager.execute_device_command(&command).await;
        assert!(matches!(result, Err(UnihubError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn should_drain_queue_in_priority_then_enqueue_order() {
        let (manager, adapter) = manager_with(Arc::new(AllowAll), ManagerConfig::default());

        let mut tickets = Vec::new();
        for (action, priority) in [("c1", 1), ("c2", 5), ("c3", 1), ("c4", 5)] {
            let command = DeviceCommand::new("mqtt-p1", CapabilityType::Switch, action);
            tickets.push(manager.queue_device_command(command, priority).unwrap());
        }
        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        assert_eq!(adapter.executed_actions(), vec!["c2", "c4", "c1", "c3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_space_queued_dispatches_by_throttle_delay() {
        let (manager, adapter) = manager_with(Arc::new(AllowAll), ManagerConfig::default());

        let t1 = manager.queue_device_command(turn_on(), 0).unwrap();
        let t2 = manager.queue_device_command(turn_on(), 0).unwrap();
        t1.wait().await.unwrap();
        t2.wait().await.unwrap();

        let instants = adapter.dispatch_instants();
        assert_eq!(instants.len(), 2);
        assert!(instants[1] - instants[0] >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn should_reject_enqueue_when_queue_is_full() {
        let (manager, _) = manager_with(
            Arc::new(DenyGate),
            ManagerConfig {
                max_queue_size: 2,
                command_throttle_delay: Duration::from_secs(60),
            },
        );

        let _t1 = manager.queue_device_command(turn_on(), 0).unwrap();
        let _t2 = manager.queue_device_command(turn_on(), 0).unwrap();
        let result = manager.queue_device_command(turn_on(), 0);
        assert!(matches!(
            result,
            Err(UnihubError::QueueFull { capacity: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_pending_tickets_on_clear_and_leave_queue_empty() {
        let (manager, adapter) = manager_with(Arc::new(AllowAll), ManagerConfig::default());

        // dispatch one item fully, then clear a fresh batch
        let done = manager.queue_device_command(turn_on(), 0).unwrap();
        done.wait().await.unwrap();

        let pending: Vec<CommandTicket> = (0..3)
            .map(|_| manager.queue_device_command(turn_on(), 0).unwrap())
            .collect();
        assert_eq!(manager.clear_queue(), 3);
        assert_eq!(manager.queue_len(), 0);

        for ticket in pending {
            assert!(matches!(
                ticket.wait().await,
                Err(UnihubError::QueueCleared)
            ));
        }
        // the already-dispatched command was unaffected
        assert_eq!(adapter.executed_actions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_continue_drain_when_one_item_fails() {
        let graph = Arc::new(EntityGraph::new());
        graph.set_device(switch_device("bad", "b1", "Broken Plug"));
        graph.set_device(switch_device("mqtt", "p1", "Plug"));
        let manager = AdapterManager::new(graph, Arc::new(AllowAll));

        let failing = FakeAdapter::failing_commands("bad", vec![switch_device("bad", "b1", "Broken Plug")]);
        let working = FakeAdapter::new("mqtt", vec![switch_device("mqtt", "p1", "Plug")]);
        manager.register_adapter(failing, 0);
        manager.register_adapter(working.clone(), 0);

        let bad = manager
            .queue_device_command(
                DeviceCommand::new("bad-b1", CapabilityType::Switch, "turn_on"),
                0,
            )
            .unwrap();
        let good = manager.queue_device_command(turn_on(), 0).unwrap();

        assert!(bad.wait().await.is_err());
        good.wait().await.unwrap();
        assert_eq!(working.executed_actions(), vec!["turn_on"]);
    }

    #[tokio::test]
    async fn should_isolate_discovery_failure_to_one_adapter() {
        let graph = Arc::new(EntityGraph::new());
        let manager = AdapterManager::new(graph, Arc::new(AllowAll));
        let working = FakeAdapter::new("mqtt", vec![switch_device("mqtt", "p1", "Plug")]);
        manager.register_adapter(working, 0);
        manager.register_adapter(FakeAdapter::failing_discovery("zwave"), 0);

        let devices = manager.discover_all_devices().await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id.as_str(), "mqtt-p1");
        assert!(manager.graph().device(&DeviceId::new("mqtt-p1")).is_some());
    }

    #[tokio::test]
    async fn should_settle_bulk_call_despite_individual_failures() {
        let (manager, adapter) = manager_with(Arc::new(AllowAll), ManagerConfig::default());

        let commands = vec![
            turn_on(),
            DeviceCommand::new("ghost", CapabilityType::Switch, "turn_on"),
        ];
        let outcomes = manager.execute_bulk_device_commands(commands).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().any(|(_, r)| r.is_ok()));
        assert!(outcomes.iter().any(|(_, r)| r.is_err()));
        assert_eq!(adapter.executed_actions(), vec!["turn_on"]);
    }

    #[tokio::test]
    async fn should_remove_graph_devices_on_unregister() {
        let (manager, _) = manager_with(Arc::new(AllowAll), ManagerConfig::default());
        assert!(manager.unregister_adapter(&AdapterId::new("mqtt")));
        assert!(manager.graph().device(&DeviceId::new("mqtt-p1")).is_none());
        assert!(!manager.unregister_adapter(&AdapterId::new("mqtt")));
    }

    #[tokio::test]
    async fn should_sort_status_reports_by_priority_then_id() {
        let graph = Arc::new(EntityGraph::new());
        let manager = AdapterManager::new(graph, Arc::new(AllowAll));
        manager.register_adapter(FakeAdapter::new("zigbee", vec![]), 10);
        manager.register_adapter(FakeAdapter::new("mqtt", vec![]), 50);
        manager.register_adapter(FakeAdapter::new("hubapi", vec![]), 10);

        let reports = manager.adapter_statuses();
        let ids: Vec<&str> = reports.iter().map(|r| r.adapter_id.as_str()).collect();
        assert_eq!(ids, vec!["mqtt", "hubapi", "zigbee"]);
    }
}
