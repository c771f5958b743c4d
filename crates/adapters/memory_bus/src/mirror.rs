//! Remote mirroring: other instances' bus entries appear in a local registry.

use std::sync::{Arc, Weak};

use plughub_app::registry::{ComponentEntry, Registry, RemoteComponent};
use plughub_domain::observer::Subscription;
use plughub_domain::plugin::{ComponentDescriptor, Plugin, PluginDescriptor};

use crate::broker::{BusEvent, Inner, MemoryBus};

const PLUGINS: &str = "plugins/";
const COMPONENTS: &str = "components/";

impl MemoryBus {
    /// Mirror every instance other than `own_instance` into `registry`:
    /// plugin descriptors become remote plugins (without implementation),
    /// component descriptors become [`RemoteComponent`]s whose states follow
    /// the bus. Metadata already retained on the bus is replayed first.
    ///
    /// A remote component is mirrored only while its bus handle exists: it is
    /// removed when the handle goes away (component destroyed or instance
    /// offline) even though its descriptor stays retained, and mirrored again
    /// when a handle reappears.
    ///
    /// Mirroring stops when the returned subscription is dropped.
    pub fn mirror_into(&self, registry: Arc<Registry>, own_instance: impl Into<String>) -> Subscription {
        let mirror = Mirror {
            bus: self.downgrade(),
            registry,
            own_instance: own_instance.into(),
        };
        let (plugins, others): (Vec<_>, Vec<_>) = self
            .all_metadata()
            .into_iter()
            .partition(|(_, path, _)| path.starts_with(PLUGINS));
        for (instance, path, value) in plugins.into_iter().chain(others) {
            mirror.metadata_set(&instance, &path, &value);
        }
        self.subscribe(move |event| mirror.apply(event))
    }
}

struct Mirror {
    bus: Weak<Inner>,
    registry: Arc<Registry>,
    own_instance: String,
}

impl Mirror {
    fn apply(&self, event: &BusEvent) {
        match event {
            BusEvent::MetadataSet {
                instance,
                path,
                value,
            } => self.metadata_set(instance, path, value),
            BusEvent::MetadataCleared { instance, path } => self.metadata_cleared(instance, path),
            BusEvent::StateSet {
                instance,
                component,
                state,
                value,
            } => self.state_set(instance, component, state, value),
            BusEvent::ComponentAdded {
                instance,
                component,
            } => self.handle_added(instance, component),
            BusEvent::ComponentRemoved {
                instance,
                component,
            } => self.handle_removed(instance, component),
        }
    }

    fn is_remote(&self, instance: &str) -> bool {
        instance != self.own_instance
    }

    fn metadata_set(&self, instance: &str, path: &str, value: &serde_json::Value) {
        if !self.is_remote(instance) {
            return;
        }
        if let Some(id) = path.strip_prefix(PLUGINS) {
            match serde_json::from_value::<PluginDescriptor>(value.clone()) {
                Ok(descriptor) => {
                    let plugin = Plugin::from_descriptor(descriptor);
                    if plugin.id != id {
                        tracing::warn!(instance, path, plugin = %plugin.id, "plugin id does not match its path");
                    }
                    self.registry.add_plugin(Some(instance), Arc::new(plugin));
                }
                Err(err) => {
                    tracing::warn!(instance, path, error = %err, "malformed remote plugin descriptor");
                }
            }
        } else if path.starts_with(COMPONENTS) {
            if let Some(descriptor) = parse_component(instance, path, value) {
                self.component_seen(instance, descriptor);
            }
        }
    }

    fn handle_added(&self, instance: &str, component: &str) {
        if !self.is_remote(instance) {
            return;
        }
        let path = format!("{COMPONENTS}{component}");
        // descriptor arrives after the handle on a first publish
        let retained = MemoryBus::upgrade(&self.bus).and_then(|bus| bus.metadata(instance, &path));
        if let Some(descriptor) = retained.and_then(|value| parse_component(instance, &path, &value)) {
            self.component_seen(instance, descriptor);
        }
    }

    fn handle_removed(&self, instance: &str, component: &str) {
        if !self.is_remote(instance) {
            return;
        }
        if self.registry.remove_component(Some(instance), component).is_some() {
            tracing::debug!(instance, component, "remote component no longer live");
        }
    }

    fn metadata_cleared(&self, instance: &str, path: &str) {
        if !self.is_remote(instance) {
            return;
        }
        if let Some(id) = path.strip_prefix(PLUGINS) {
            self.registry.remove_plugin(Some(instance), id);
        } else if let Some(id) = path.strip_prefix(COMPONENTS) {
            self.registry.remove_component(Some(instance), id);
        }
    }

    fn component_seen(&self, instance: &str, descriptor: ComponentDescriptor) {
        let Some(bus) = MemoryBus::upgrade(&self.bus) else {
            return;
        };
        if !bus.has_component(instance, &descriptor.id) {
            tracing::debug!(instance, component = %descriptor.id, "retained component without handle");
            return;
        }
        let known = self.remote_component(instance, &descriptor.id);
        if known
            .as_ref()
            .is_some_and(|remote| remote.plugin_id() == descriptor.plugin)
        {
            return;
        }
        let remote = Arc::new(RemoteComponent::new(&descriptor.id, &descriptor.plugin));
        let published = bus.states(instance, &descriptor.id).unwrap_or_default();
        for (state, bytes) in published {
            self.decode_into(instance, &remote, &state, &bytes);
        }
        self.registry
            .add_component(Some(instance), ComponentEntry::Remote(remote));
    }

    fn state_set(&self, instance: &str, component: &str, state: &str, bytes: &[u8]) {
        if !self.is_remote(instance) {
            return;
        }
        if let Some(remote) = self.remote_component(instance, component) {
            self.decode_into(instance, &remote, state, bytes);
        }
    }

    fn decode_into(&self, instance: &str, remote: &RemoteComponent, state: &str, bytes: &[u8]) {
        let Some(plugin) = self.registry.get_plugin(Some(instance), remote.plugin_id()) else {
            tracing::debug!(instance, component = %remote.id(), "state of component with unknown plugin");
            return;
        };
        let Some(member) = plugin.member(state) else {
            return;
        };
        match member.value_type.decode(bytes) {
            Ok(value) => remote.set_state(state, value),
            Err(err) => {
                tracing::warn!(instance, component = %remote.id(), state, error = %err, "undecodable remote state");
            }
        }
    }

    fn remote_component(&self, instance: &str, id: &str) -> Option<Arc<RemoteComponent>> {
        self.registry
            .get_components(Some(instance))
            .into_iter()
            .find_map(|entry| match entry {
                ComponentEntry::Remote(remote) if remote.id() == id => Some(remote),
                _ => None,
            })
    }
}

fn parse_component(instance: &str, path: &str, value: &serde_json::Value) -> Option<ComponentDescriptor> {
    serde_json::from_value(value.clone())
        .inspect_err(|err| {
            tracing::warn!(instance, path, error = %err, "malformed remote component descriptor");
        })
        .ok()
}
