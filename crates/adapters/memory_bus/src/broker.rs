//! Shared broker: retained metadata and component handles of every instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use plughub_app::ports::ActionCallback;
use plughub_domain::observer::{Observers, Subscription};

use crate::config::MemoryBusConfig;
use crate::error::MemoryBusError;
use crate::transport::MemoryTransport;

/// Something that became visible on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    MetadataSet {
        instance: String,
        path: String,
        value: serde_json::Value,
    },
    MetadataCleared {
        instance: String,
        path: String,
    },
    ComponentAdded {
        instance: String,
        component: String,
    },
    ComponentRemoved {
        instance: String,
        component: String,
    },
    StateSet {
        instance: String,
        component: String,
        state: String,
        value: Vec<u8>,
    },
}

type SlotKey = (String, String);

#[derive(Default)]
struct Slot {
    generation: u64,
    actions: HashMap<String, ActionCallback>,
    states: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
struct Broker {
    metadata: BTreeMap<(String, String), serde_json::Value>,
    slots: HashMap<SlotKey, Slot>,
    next_generation: u64,
}

pub(crate) struct Inner {
    config: MemoryBusConfig,
    broker: Mutex<Broker>,
    events: Observers<BusEvent>,
}

/// In-process bus shared by every [`MemoryTransport`]. Cheap to clone.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(MemoryBusConfig::default())
    }
}

impl MemoryBus {
    #[must_use]
    pub fn new(config: MemoryBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                broker: Mutex::default(),
                events: Observers::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MemoryBusConfig {
        &self.inner.config
    }

    /// Open a client connection for `instance`.
    #[must_use]
    pub fn connect(&self, instance: impl Into<String>) -> Arc<MemoryTransport> {
        let instance = instance.into();
        tracing::info!(instance = %instance, online = self.inner.config.start_online, "bus client connected");
        Arc::new(MemoryTransport::new(
            self.clone(),
            instance,
            self.inner.config.start_online,
        ))
    }

    /// Observe everything published on the bus. Listeners run synchronously,
    /// after the broker lock is released.
    pub fn subscribe(&self, listener: impl Fn(&BusEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.events.subscribe(listener)
    }

    /// Retained metadata document of `instance` under `path`.
    #[must_use]
    pub fn metadata(&self, instance: &str, path: &str) -> Option<serde_json::Value> {
        self.lock()
            .metadata
            .get(&(instance.to_string(), path.to_string()))
            .cloned()
    }

    /// Every retained metadata document, as `(instance, path, value)`.
    #[must_use]
    pub fn all_metadata(&self) -> Vec<(String, String, serde_json::Value)> {
        self.lock()
            .metadata
            .iter()
            .map(|((instance, path), value)| (instance.clone(), path.clone(), value.clone()))
            .collect()
    }

    /// Whether `component` of `instance` currently has a handle on the bus.
    #[must_use]
    pub fn has_component(&self, instance: &str, component: &str) -> bool {
        self.lock()
            .slots
            .contains_key(&(instance.to_string(), component.to_string()))
    }

    /// Last encoded value of every state published by a component handle.
    #[must_use]
    pub fn states(&self, instance: &str, component: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.lock()
            .slots
            .get(&(instance.to_string(), component.to_string()))
            .map(|slot| slot.states.clone())
    }

    /// Invoke an action of a remote component with an encoded argument, the
    /// way another instance would.
    ///
    /// # Errors
    ///
    /// [`MemoryBusError::UnknownComponent`] without a handle,
    /// [`MemoryBusError::UnknownAction`] without a registered callback.
    pub fn invoke_action(
        &self,
        instance: &str,
        component: &str,
        action: &str,
        payload: &[u8],
    ) -> Result<(), MemoryBusError> {
        let callback = {
            let broker = self.lock();
            let slot = broker
                .slots
                .get(&(instance.to_string(), component.to_string()))
                .ok_or_else(|| MemoryBusError::UnknownComponent {
                    instance: instance.to_string(),
                    component: component.to_string(),
                })?;
            slot.actions
                .get(action)
                .cloned()
                .ok_or_else(|| MemoryBusError::UnknownAction {
                    component: component.to_string(),
                    action: action.to_string(),
                })?
        };
        tracing::debug!(instance, component, action, "invoking bus action");
        callback(payload);
        Ok(())
    }

    // -- operations issued by clients ----------------------------------------

    pub(crate) fn set_metadata(&self, instance: &str, path: &str, value: serde_json::Value) {
        self.lock().metadata.insert(
            (instance.to_string(), path.to_string()),
            value.clone(),
        );
        self.emit(&BusEvent::MetadataSet {
            instance: instance.to_string(),
            path: path.to_string(),
            value,
        });
    }

    pub(crate) fn clear_metadata(&self, instance: &str, path: &str) {
        let removed = self
            .lock()
            .metadata
            .remove(&(instance.to_string(), path.to_string()));
        if removed.is_some() {
            self.emit(&BusEvent::MetadataCleared {
                instance: instance.to_string(),
                path: path.to_string(),
            });
        }
    }

    /// Create (or replace) the slot of a component; returns its generation.
    pub(crate) fn add_component(&self, instance: &str, component: &str) -> u64 {
        let generation = {
            let mut broker = self.lock();
            broker.next_generation += 1;
            let generation = broker.next_generation;
            broker.slots.insert(
                (instance.to_string(), component.to_string()),
                Slot {
                    generation,
                    ..Slot::default()
                },
            );
            generation
        };
        self.emit(&BusEvent::ComponentAdded {
            instance: instance.to_string(),
            component: component.to_string(),
        });
        generation
    }

    pub(crate) fn remove_component(&self, instance: &str, component: &str) {
        let removed = self
            .lock()
            .slots
            .remove(&(instance.to_string(), component.to_string()));
        if removed.is_some() {
            self.emit(&BusEvent::ComponentRemoved {
                instance: instance.to_string(),
                component: component.to_string(),
            });
        }
    }

    /// Drop every handle of `instance` (its connection went away).
    pub(crate) fn remove_instance_components(&self, instance: &str) {
        let removed: Vec<String> = {
            let mut broker = self.lock();
            let keys: Vec<SlotKey> = broker
                .slots
                .keys()
                .filter(|(owner, _)| owner == instance)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| broker.slots.remove(&key).map(|_| key.1))
                .collect()
        };
        for component in removed {
            self.emit(&BusEvent::ComponentRemoved {
                instance: instance.to_string(),
                component,
            });
        }
    }

    pub(crate) fn register_action(
        &self,
        instance: &str,
        component: &str,
        generation: u64,
        action: &str,
        callback: ActionCallback,
    ) -> Result<(), MemoryBusError> {
        let mut broker = self.lock();
        let slot = live_slot(&mut broker, instance, component, generation)?;
        slot.actions.insert(action.to_string(), callback);
        Ok(())
    }

    pub(crate) fn set_state(
        &self,
        instance: &str,
        component: &str,
        generation: u64,
        state: &str,
        value: Vec<u8>,
    ) -> Result<(), MemoryBusError> {
        {
            let mut broker = self.lock();
            let slot = live_slot(&mut broker, instance, component, generation)?;
            slot.states.insert(state.to_string(), value.clone());
        }
        self.emit(&BusEvent::StateSet {
            instance: instance.to_string(),
            component: component.to_string(),
            state: state.to_string(),
            value,
        });
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    fn emit(&self, event: &BusEvent) {
        self.inner.events.emit(event);
    }

    fn lock(&self) -> MutexGuard<'_, Broker> {
        self.inner
            .broker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn live_slot<'b>(
    broker: &'b mut Broker,
    instance: &str,
    component: &str,
    generation: u64,
) -> Result<&'b mut Slot, MemoryBusError> {
    match broker
        .slots
        .get_mut(&(instance.to_string(), component.to_string()))
    {
        Some(slot) if slot.generation == generation => Ok(slot),
        Some(_) => Err(MemoryBusError::StaleHandle(component.to_string())),
        None => Err(MemoryBusError::UnknownComponent {
            instance: instance.to_string(),
            component: component.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn should_retain_metadata_per_instance() {
        let bus = MemoryBus::default();
        bus.set_metadata("a", "plugins/x", serde_json::json!({ "v": 1 }));
        bus.set_metadata("b", "plugins/x", serde_json::json!({ "v": 2 }));
        bus.set_metadata("a", "plugins/x", serde_json::json!({ "v": 3 }));

        assert_eq!(
            bus.metadata("a", "plugins/x"),
            Some(serde_json::json!({ "v": 3 }))
        );
        assert_eq!(bus.all_metadata().len(), 2);

        bus.clear_metadata("a", "plugins/x");
        bus.clear_metadata("a", "plugins/x");
        assert!(bus.metadata("a", "plugins/x").is_none());
    }

    #[test]
    fn should_emit_events_after_releasing_lock() {
        let bus = MemoryBus::default();
        let inner = bus.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            if let BusEvent::MetadataSet { path, .. } = event {
                sink.lock()
                    .unwrap()
                    .push(inner.metadata("a", path).is_some());
            }
        });

        bus.set_metadata("a", "plugins/x", serde_json::json!({}));
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[test]
    fn should_invoke_registered_action() {
        let bus = MemoryBus::default();
        let generation = bus.add_component("a", "c1");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.register_action(
            "a",
            "c1",
            generation,
            "toggle",
            Arc::new(move |payload: &[u8]| {
                assert_eq!(payload, &[1]);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        bus.invoke_action("a", "c1", "toggle", &[1]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            bus.invoke_action("a", "c1", "missing", &[1]),
            Err(MemoryBusError::UnknownAction { .. })
        ));
        assert!(matches!(
            bus.invoke_action("b", "c1", "toggle", &[1]),
            Err(MemoryBusError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn should_reject_superseded_handle() {
        let bus = MemoryBus::default();
        let old = bus.add_component("a", "c1");
        let new = bus.add_component("a", "c1");

        assert!(matches!(
            bus.set_state("a", "c1", old, "on", vec![1]),
            Err(MemoryBusError::StaleHandle(_))
        ));
        bus.set_state("a", "c1", new, "on", vec![1]).unwrap();
        assert_eq!(bus.states("a", "c1").unwrap()["on"], vec![1]);
    }

    #[test]
    fn should_drop_all_handles_of_instance() {
        let bus = MemoryBus::default();
        bus.add_component("a", "c1");
        bus.add_component("a", "c2");
        bus.add_component("b", "c1");

        bus.remove_instance_components("a");

        assert!(!bus.has_component("a", "c1"));
        assert!(!bus.has_component("a", "c2"));
        assert!(bus.has_component("b", "c1"));
    }
}
