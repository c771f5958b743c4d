//! # plughubd: plughub daemon
//!
//! Composition root that wires the driver modules, the registry and the bus
//! together.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialize structured logging
//! - Build the enabled driver modules into the registry
//! - Create the configured components
//! - Connect to the bus, publish local entries and mirror remote ones
//! - Drive simulated sensor readings and optional connectivity flapping
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no plugin logic belongs here.
//!
//! ## Threading
//! Everything runs on one current-thread runtime. Registry callbacks, bus
//! events and the spawned loops never execute concurrently.

mod config;

use std::sync::Arc;
use std::time::Duration;

use plughub_adapter_memory_bus::{MemoryBus, MemoryTransport};
use plughub_app::ports::Transport;
use plughub_app::publisher::BusPublisher;
use plughub_app::registry::Registry;
use plughub_app::state_feed::StateFeed;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{ComponentSpec, Config, SimulationConfig};

const STATE_FEED_CAPACITY: usize = 256;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime()?.block_on(run())
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_logging(&config.logging.filter);
    tracing::info!(instance = %config.instance.name, "starting plughubd");

    // Registry and driver modules
    let registry = Arc::new(Registry::new());
    if config.modules.virtual_enabled {
        let plugins = plughub_adapter_virtual::build(&registry)?;
        tracing::info!(
            module = plughub_adapter_virtual::MODULE,
            plugins = plugins.len(),
            "module built"
        );
    }

    // Local state changes
    let feed = StateFeed::attach(&registry, STATE_FEED_CAPACITY);
    tokio::spawn(log_state_changes(feed.subscribe()));

    create_components(&registry, &config.components);

    // Bus
    let bus = MemoryBus::new(config.bus.clone());
    let transport = bus.connect(config.instance.name.as_str());
    let _mirror = bus.mirror_into(Arc::clone(&registry), config.instance.name.as_str());
    let mut publisher = BusPublisher::start(&registry, transport.clone());

    if config.bus.flap_interval_secs > 0 {
        tokio::spawn(flap_connectivity(
            Arc::clone(&transport),
            Duration::from_secs(config.bus.flap_interval_secs),
        ));
    }
    if config.simulation.sensor_interval_secs > 0 {
        tokio::spawn(simulate_sensors(Arc::clone(&registry), config.simulation));
    }

    tracing::info!(
        components = registry.get_components(None).len(),
        online = publisher.is_online(),
        "plughubd running"
    );
    tokio::signal::ctrl_c().await?;

    // Shutdown
    tracing::info!("shutting down");
    publisher.close();
    for entry in registry.get_components(None) {
        if let Err(err) = registry.destroy_component(entry.id()) {
            tracing::warn!(component = %entry.id(), error = %err, "component not destroyed");
        }
    }
    registry.close();

    Ok(())
}

fn init_logging(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter '{filter}': {err}");
        tracing_subscriber::EnvFilter::new("info")
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Create every configured component. A rejected component is logged and
/// skipped; the others are still created.
fn create_components(registry: &Registry, components: &[ComponentSpec]) {
    for spec in components {
        match registry.create_component(&spec.id, &spec.plugin, &spec.config) {
            Ok(host) => {
                tracing::info!(component = %spec.id, plugin = %host.plugin().id, "component created");
            }
            Err(err) => {
                tracing::error!(component = %spec.id, plugin = %spec.plugin, error = %err, "component not created");
            }
        }
    }
}

async fn log_state_changes(
    mut changes: tokio::sync::broadcast::Receiver<plughub_domain::component::StateChange>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                tracing::debug!(
                    component = %change.component,
                    state = %change.member,
                    value = %change.value,
                    "state changed"
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "state feed lagging");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn flap_connectivity(transport: Arc<MemoryTransport>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        transport.set_online(!transport.is_online());
    }
}

async fn simulate_sensors(registry: Arc<Registry>, simulation: SimulationConfig) {
    let mut ticker = tokio::time::interval(Duration::from_secs(simulation.sensor_interval_secs));
    let mut step: u32 = 0;
    loop {
        ticker.tick().await;
        // slow saw-tooth of one degree around the baseline
        let offset = f64::from(step % 10) / 10.0 - 0.5;
        let updated = plughub_adapter_virtual::tick_sensors(&registry, simulation.base_celsius + offset);
        tracing::trace!(updated, "sensor readings pushed");
        step = step.wrapping_add(1);
    }
}
