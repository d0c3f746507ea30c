//! # unihubd — unihub daemon
//!
//! Composition root that wires the entity graph, the adapter manager, and
//! the enabled protocol adapters together.
//!
//! ## Responsibilities
//! - Load configuration (`unihub.toml` plus env overrides)
//! - Initialize logging
//! - Construct enabled adapters (configuration errors abort startup)
//! - Register adapters, initialize them, run initial discovery
//! - Forward adapter events onto the shared event bus
//! - Handle graceful shutdown (ctrl-c)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio::sync::broadcast;

use unihub_adapter_hubapi::HubApiAdapter;
use unihub_adapter_mqtt::MqttAdapter;
use unihub_adapter_zigbee::ZigbeeAdapter;
use unihub_adapter_zwave::ZwaveAdapter;
use unihub_app::event_bus::AdapterEventBus;
use unihub_app::graph::EntityGraph;
use unihub_app::manager::AdapterManager;
use unihub_app::ports::adapter::DeviceAdapter;
use unihub_app::ports::policy::AllowAll;
use unihub_domain::adapter::AdapterEvent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(
            &config.logging.filter,
        )?)
        .init();

    let graph = Arc::new(EntityGraph::new());
    let bus = AdapterEventBus::new(256);
    let manager = AdapterManager::with_config(
        Arc::clone(&graph),
        Arc::new(AllowAll),
        config.manager_config(),
    );

    // Construction is fail-fast: a bad adapter config aborts startup.
    let mut adapters: Vec<(Arc<dyn DeviceAdapter>, i32)> = Vec::new();
    if config.adapters.mqtt.enabled {
        adapters.push((
            Arc::new(MqttAdapter::new(config.adapters.mqtt.config.clone())?),
            config.adapters.mqtt.priority,
        ));
    }
    if config.adapters.zigbee.enabled {
        adapters.push((
            Arc::new(ZigbeeAdapter::new(config.adapters.zigbee.config.clone())?),
            config.adapters.zigbee.priority,
        ));
    }
    if config.adapters.zwave.enabled {
        adapters.push((
            Arc::new(ZwaveAdapter::new(config.adapters.zwave.config.clone())?),
            config.adapters.zwave.priority,
        ));
    }
    if config.adapters.hubapi.enabled {
        adapters.push((
            Arc::new(HubApiAdapter::new(config.adapters.hubapi.config.clone())?),
            config.adapters.hubapi.priority,
        ));
    }
    if adapters.is_empty() {
        tracing::warn!("no adapters enabled; unihubd will idle");
    }

    for (adapter, priority) in &adapters {
        tokio::spawn(forward_events(adapter.events(), bus.clone()));
        manager.register_adapter(Arc::clone(adapter), *priority);
    }

    // A failed initial connection is not fatal; the backoff loop keeps
    // trying in the background.
    for (adapter, _) in &adapters {
        match adapter.initialize().await {
            Ok(()) => tracing::info!(adapter_id = %adapter.id(), "adapter initialized"),
            Err(err) => {
                tracing::warn!(adapter_id = %adapter.id(), error = %err, "initialize failed");
                let adapter = Arc::clone(adapter);
                tokio::spawn(async move {
                    if let Err(err) = adapter.reconnect().await {
                        tracing::error!(adapter_id = %adapter.id(), error = %err, "gave up reconnecting");
                    }
                });
            }
        }
    }

    let devices = manager.discover_all_devices().await;
    let scenes = manager.discover_all_scenes().await;
    let areas = manager.discover_all_areas().await;
    tracing::info!(
        devices = devices.len(),
        scenes = scenes.len(),
        areas = areas.len(),
        "initial discovery complete"
    );

    // Tail the event bus so adapter activity shows up in the logs.
    let mut tail = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match tail.recv().await {
                Ok(event) => tracing::info!(
                    adapter_id = %event.adapter_id,
                    event_type = ?event.event_type,
                    "adapter event"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event tail lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    manager.shutdown().await;
    Ok(())
}

/// Republish one adapter's event stream onto the shared bus.
async fn forward_events(mut events: broadcast::Receiver<AdapterEvent>, bus: AdapterEventBus) {
    loop {
        match events.recv().await {
            Ok(event) => bus.publish(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "adapter event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
