//! Bus publisher: mirrors the registry's local plugins and components onto
//! a [`Transport`].
//!
//! On every transition to online the publisher replays the full local state:
//! all plugin descriptors first, then every component (handle, action
//! callbacks, states, descriptor). A component's plugin metadata is therefore
//! always issued before the component's handle. Going offline withdraws the
//! component handles; plugin and component metadata are left untouched.
//!
//! Bus requests are fire-and-forget. Two quick connectivity flaps may let a
//! slow publish complete after the following teardown started; every request
//! targets an idempotent key, so the bus converges on the last request issued
//! for each key.

mod component;
mod plugin;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use plughub_domain::component::ComponentHost;
use plughub_domain::observer::Subscription;
use plughub_domain::plugin::Plugin;

use crate::detached::Detacher;
use crate::ports::{ComponentHandle, Transport};
use crate::registry::{ComponentEntry, ComponentEvent, PluginEvent, Registry};

use self::component::BusComponent;
use self::plugin::BusPlugin;

/// Transport plus the detacher completing its requests.
#[derive(Clone)]
pub(crate) struct Bus {
    transport: Arc<dyn Transport>,
    detacher: Detacher,
}

impl Bus {
    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn set_metadata(&self, path: &str, value: serde_json::Value) {
        let request = self.transport.set_metadata(path, value);
        self.detacher.detach("set_metadata", path.to_string(), request);
    }

    fn clear_metadata(&self, path: &str) {
        let request = self.transport.clear_metadata(path);
        self.detacher.detach("clear_metadata", path.to_string(), request);
    }

    fn remove_local_component(&self, id: &str) {
        let request = self.transport.remove_local_component(id);
        self.detacher
            .detach("remove_local_component", id.to_string(), request);
    }

    fn set_state(&self, handle: &dyn ComponentHandle, name: &str, value: Vec<u8>) {
        let request = handle.set_state(name, value);
        self.detacher
            .detach("set_state", format!("{}/{name}", handle.id()), request);
    }
}

struct Shared {
    bus: Bus,
    online: bool,
    closed: bool,
    plugins: BTreeMap<String, BusPlugin>,
    components: BTreeMap<String, BusComponent>,
}

impl Shared {
    fn add_plugin(&mut self, plugin: Arc<Plugin>) {
        if self.closed {
            return;
        }
        let id = plugin.id.clone();
        let wrapper = BusPlugin::new(plugin);
        if self.online {
            wrapper.online(&self.bus);
        }
        self.plugins.insert(id, wrapper);
    }

    fn remove_plugin(&mut self, id: &str) {
        if let Some(wrapper) = self.plugins.remove(id) {
            wrapper.close(&self.bus);
        }
    }

    fn add_component(&mut self, host: Arc<ComponentHost>) {
        if self.closed {
            return;
        }
        let id = host.id().to_string();
        if let Some(mut previous) = self.components.remove(&id) {
            previous.close(&self.bus);
        }
        let mut wrapper = BusComponent::new(host);
        if self.online {
            wrapper.online(&self.bus);
        }
        self.components.insert(id, wrapper);
    }

    fn remove_component(&mut self, id: &str) {
        if let Some(mut wrapper) = self.components.remove(id) {
            wrapper.close(&self.bus);
        }
    }

    fn set_online(&mut self, online: bool) {
        if self.closed {
            return;
        }
        self.online = online;
        tracing::info!(online, "bus connectivity changed");
        let Self {
            bus,
            plugins,
            components,
            ..
        } = self;
        if online {
            for wrapper in plugins.values() {
                wrapper.online(bus);
            }
            for wrapper in components.values_mut() {
                wrapper.online(bus);
            }
        } else {
            for wrapper in components.values_mut() {
                wrapper.offline(bus);
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for (_, mut wrapper) in std::mem::take(&mut self.components) {
            wrapper.close(&self.bus);
        }
        for (_, wrapper) in std::mem::take(&mut self.plugins) {
            wrapper.close(&self.bus);
        }
    }
}

/// Keeps the bus view of local entries consistent with a [`Registry`].
pub struct BusPublisher {
    shared: Arc<Mutex<Shared>>,
    subscriptions: Vec<Subscription>,
}

impl BusPublisher {
    /// Wrap the existing local plugins, then the existing local components,
    /// and start following the registry and the transport.
    ///
    /// Should be called from within a tokio runtime, which then completes
    /// the bus requests.
    pub fn start(registry: &Registry, transport: Arc<dyn Transport>) -> Self {
        let online = transport.is_online();
        let shared = Arc::new(Mutex::new(Shared {
            bus: Bus {
                transport: Arc::clone(&transport),
                detacher: Detacher::current(),
            },
            online,
            closed: false,
            plugins: BTreeMap::new(),
            components: BTreeMap::new(),
        }));

        {
            let mut state = lock(&shared);
            for plugin in registry.get_plugins(None) {
                state.add_plugin(plugin);
            }
            for entry in registry.get_components(None) {
                if let ComponentEntry::Local(host) = entry {
                    state.add_component(host);
                }
            }
            tracing::info!(
                online,
                plugins = state.plugins.len(),
                components = state.components.len(),
                "bus publisher started"
            );
        }

        let plugins = {
            let shared = Arc::downgrade(&shared);
            registry.subscribe_plugins(move |event| match event {
                PluginEvent::Added {
                    instance: None,
                    plugin,
                } => with_shared(&shared, |state| state.add_plugin(Arc::clone(plugin))),
                PluginEvent::Removed {
                    instance: None,
                    plugin,
                } => with_shared(&shared, |state| state.remove_plugin(&plugin.id)),
                _ => {}
            })
        };
        let components = {
            let shared = Arc::downgrade(&shared);
            registry.subscribe_components(move |event| match event {
                ComponentEvent::Added {
                    instance: None,
                    component: ComponentEntry::Local(host),
                } => with_shared(&shared, |state| state.add_component(Arc::clone(host))),
                ComponentEvent::Removed {
                    instance: None,
                    component,
                } => with_shared(&shared, |state| state.remove_component(component.id())),
                _ => {}
            })
        };
        let connectivity = {
            let shared = Arc::downgrade(&shared);
            transport.subscribe_online(Box::new(move |online: bool| {
                with_shared(&shared, |state| state.set_online(online));
            }))
        };

        Self {
            shared,
            subscriptions: vec![plugins, components, connectivity],
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        lock(&self.shared).online
    }

    /// Stop following the registry and withdraw everything from the bus:
    /// components first, then plugin metadata. Idempotent.
    pub fn close(&mut self) {
        self.subscriptions.clear();
        let mut state = lock(&self.shared);
        if !state.closed {
            state.close();
            tracing::info!("bus publisher closed");
        }
    }
}

impl Drop for BusPublisher {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn with_shared(shared: &Weak<Mutex<Shared>>, apply: impl FnOnce(&mut Shared)) {
    if let Some(shared) = shared.upgrade() {
        apply(&mut lock(&shared));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tokio::sync::Semaphore;

    use plughub_domain::component::{ComponentConfig, StateWriter};
    use plughub_domain::error::ComponentError;
    use plughub_domain::observer::Observers;
    use plughub_domain::plugin::{PluginInstance, Usage};
    use plughub_domain::types::Type;
    use plughub_domain::value::Value;

    use crate::builder::ModuleBuilder;
    use crate::ports::{ActionCallback, OnlineListener, TransportFuture};
    use crate::registry::RemoteComponent;

    // -- recording transport ------------------------------------------------

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        actions: Mutex<HashMap<(String, String), ActionCallback>>,
    }

    impl Recorder {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    struct RecordingHandle {
        id: String,
        recorder: Arc<Recorder>,
    }

    impl ComponentHandle for RecordingHandle {
        fn id(&self) -> &str {
            &self.id
        }

        fn register_action(&self, name: &str, callback: ActionCallback) {
            self.recorder
                .record(format!("register_action {}/{name}", self.id));
            self.recorder
                .actions
                .lock()
                .unwrap()
                .insert((self.id.clone(), name.to_string()), callback);
        }

        fn set_state(&self, name: &str, value: Vec<u8>) -> TransportFuture {
            self.recorder
                .record(format!("set_state {}/{name} {value:?}", self.id));
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        online: Mutex<bool>,
        listeners: Observers<bool>,
        recorder: Arc<Recorder>,
        metadata_gate: Mutex<Option<Arc<Semaphore>>>,
    }

    impl RecordingTransport {
        fn set_online(&self, online: bool) {
            *self.online.lock().unwrap() = online;
            self.listeners.emit(&online);
        }

        /// Keep every later `set_metadata` request pending until the returned
        /// gate is closed. Completion is recorded as `completed set_metadata`.
        fn hold_metadata(&self) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            *self.metadata_gate.lock().unwrap() = Some(Arc::clone(&gate));
            gate
        }

        fn calls(&self) -> Vec<String> {
            self.recorder.calls.lock().unwrap().clone()
        }

        fn take_calls(&self) -> Vec<String> {
            std::mem::take(&mut *self.recorder.calls.lock().unwrap())
        }

        fn invoke(&self, component: &str, action: &str, payload: &[u8]) {
            let callback = self
                .recorder
                .actions
                .lock()
                .unwrap()
                .get(&(component.to_string(), action.to_string()))
                .cloned()
                .expect("action registered");
            callback(payload);
        }
    }

    impl Transport for RecordingTransport {
        fn is_online(&self) -> bool {
            *self.online.lock().unwrap()
        }

        fn subscribe_online(&self, listener: OnlineListener) -> Subscription {
            self.listeners.subscribe(move |online| listener(*online))
        }

        fn set_metadata(&self, path: &str, _value: serde_json::Value) -> TransportFuture {
            self.recorder.record(format!("set_metadata {path}"));
            let gate = self.metadata_gate.lock().unwrap().clone();
            let recorder = Arc::clone(&self.recorder);
            let path = path.to_string();
            Box::pin(async move {
                if let Some(gate) = gate {
                    drop(gate.acquire().await);
                    recorder.record(format!("completed set_metadata {path}"));
                }
                Ok(())
            })
        }

        fn clear_metadata(&self, path: &str) -> TransportFuture {
            self.recorder.record(format!("clear_metadata {path}"));
            Box::pin(async { Ok(()) })
        }

        fn add_local_component(&self, id: &str) -> Arc<dyn ComponentHandle> {
            self.recorder.record(format!("add_local_component {id}"));
            self.recorder
                .actions
                .lock()
                .unwrap()
                .retain(|(component, _), _| component != id);
            Arc::new(RecordingHandle {
                id: id.to_string(),
                recorder: Arc::clone(&self.recorder),
            })
        }

        fn remove_local_component(&self, id: &str) -> TransportFuture {
            self.recorder.record(format!("remove_local_component {id}"));
            self.recorder
                .actions
                .lock()
                .unwrap()
                .retain(|(component, _), _| component != id);
            Box::pin(async { Ok(()) })
        }
    }

    // -- fixtures -------------------------------------------------------------

    struct Switch;

    impl PluginInstance for Switch {}

    impl Switch {
        fn create(
            _config: &ComponentConfig,
            _states: &mut StateWriter<'_>,
        ) -> Result<Self, ComponentError> {
            Ok(Self)
        }

        fn set(&mut self, on: bool, states: &mut StateWriter<'_>) -> Result<(), ComponentError> {
            states.set("on", on)
        }
    }

    fn build(registry: &Registry) {
        let mut module = ModuleBuilder::begin("test", "1.0.0", registry).unwrap();
        module
            .class("switch", Switch::create)
            .plugin(Usage::Actuator)
            .state("on", Type::Bool)
            .action("set", Type::Bool, Switch::set);
        module.end().unwrap();
    }

    fn setup(online: bool) -> (Arc<Registry>, Arc<RecordingTransport>) {
        let registry = Arc::new(Registry::new());
        build(&registry);
        let transport = Arc::new(RecordingTransport::default());
        *transport.online.lock().unwrap() = online;
        (registry, transport)
    }

    fn position(calls: &[String], call: &str) -> usize {
        calls
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("missing call {call}: {calls:?}"))
    }

    // -- tests ----------------------------------------------------------------

    #[tokio::test]
    async fn should_publish_plugin_before_component_when_going_online() {
        let (registry, transport) = setup(false);
        registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        let _publisher = BusPublisher::start(&registry, transport.clone());
        assert!(transport.calls().is_empty());

        transport.set_online(true);

        assert_eq!(
            transport.calls(),
            vec![
                "set_metadata plugins/test.switch",
                "add_local_component s1",
                "register_action s1/set",
                "set_state s1/on [0]",
                "set_metadata components/s1",
            ]
        );
    }

    #[tokio::test]
    async fn should_publish_new_entries_immediately_while_online() {
        let (registry, transport) = setup(true);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();

        let calls = transport.calls();
        assert!(
            position(&calls, "set_metadata plugins/test.switch")
                < position(&calls, "add_local_component s1")
        );
        assert_eq!(calls.last().unwrap(), "set_metadata components/s1");
    }

    #[tokio::test]
    async fn should_route_bus_action_to_component_and_forward_change() {
        let (registry, transport) = setup(true);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        let host = registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        transport.take_calls();

        transport.invoke("s1", "set", &[1]);

        assert_eq!(host.state("on"), Some(Value::Bool(true)));
        assert_eq!(transport.calls(), vec!["set_state s1/on [1]"]);
    }

    #[tokio::test]
    async fn should_drop_undecodable_action_payload() {
        let (registry, transport) = setup(true);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        let host = registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        transport.take_calls();

        transport.invoke("s1", "set", &[7]);
        transport.invoke("s1", "set", &[]);

        assert_eq!(host.state("on"), Some(Value::Bool(false)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn should_withdraw_handle_but_keep_metadata_when_going_offline() {
        let (registry, transport) = setup(true);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        let host = registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        transport.take_calls();

        transport.set_online(false);
        assert_eq!(transport.take_calls(), vec!["remove_local_component s1"]);

        host.execute_action("set", Value::Bool(true)).unwrap();
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn should_republish_everything_on_each_online_transition() {
        let (registry, transport) = setup(false);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        let host = registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();

        transport.set_online(true);
        let first = transport.take_calls();
        transport.set_online(false);
        host.execute_action("set", Value::Bool(true)).unwrap();
        transport.take_calls();
        transport.set_online(true);
        let second = transport.take_calls();

        assert_eq!(first.len(), second.len());
        assert!(second.contains(&"set_state s1/on [1]".to_string()));

        transport.invoke("s1", "set", &[0]);
        assert_eq!(host.state("on"), Some(Value::Bool(false)));
        assert_eq!(transport.calls(), vec!["set_state s1/on [0]"]);
    }

    #[tokio::test]
    async fn should_converge_when_flapping_quickly() {
        let (registry, transport) = setup(false);
        registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        let _publisher = BusPublisher::start(&registry, transport.clone());

        transport.set_online(true);
        transport.set_online(false);
        transport.set_online(true);

        let calls = transport.calls();
        let last_add = calls
            .iter()
            .rposition(|c| c == "add_local_component s1")
            .unwrap();
        let last_remove = calls
            .iter()
            .rposition(|c| c == "remove_local_component s1")
            .unwrap();
        assert!(last_add > last_remove);
        assert_eq!(calls.last().unwrap(), "set_metadata components/s1");
    }

    #[tokio::test]
    async fn should_ignore_publish_completing_after_going_offline() {
        let (registry, transport) = setup(false);
        let host = registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        let publisher = BusPublisher::start(&registry, transport.clone());
        let gate = transport.hold_metadata();

        transport.set_online(true);
        let first = transport.take_calls();
        transport.set_online(false);
        assert_eq!(transport.take_calls(), vec!["remove_local_component s1"]);
        tokio::task::yield_now().await;
        assert!(transport.calls().is_empty());

        gate.close();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let mut late = transport.take_calls();
        late.sort();
        assert_eq!(
            late,
            vec![
                "completed set_metadata components/s1",
                "completed set_metadata plugins/test.switch",
            ]
        );
        assert!(!publisher.is_online());
        host.execute_action("set", Value::Bool(true)).unwrap();
        assert!(transport.calls().is_empty());

        transport.set_online(true);
        let second = transport.take_calls();
        assert_eq!(second.len(), first.len());
        assert_eq!(
            position(&second, "set_metadata plugins/test.switch"),
            position(&first, "set_metadata plugins/test.switch")
        );
        assert!(second.contains(&"set_state s1/on [1]".to_string()));
        assert_eq!(second.last().unwrap(), "set_metadata components/s1");
        assert!(publisher.is_online());
    }

    #[tokio::test]
    async fn should_clear_plugin_metadata_on_removal_even_offline() {
        let (registry, transport) = setup(false);
        let _publisher = BusPublisher::start(&registry, transport.clone());

        ModuleBuilder::unload("test", &registry);

        assert_eq!(
            transport.calls(),
            vec!["clear_metadata plugins/test.switch"]
        );
    }

    #[tokio::test]
    async fn should_remove_handle_when_component_destroyed() {
        let (registry, transport) = setup(true);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        transport.take_calls();

        registry.destroy_component("s1").unwrap();

        assert_eq!(transport.calls(), vec!["remove_local_component s1"]);
    }

    #[tokio::test]
    async fn should_ignore_remote_entries() {
        let (registry, transport) = setup(true);
        let _publisher = BusPublisher::start(&registry, transport.clone());
        transport.take_calls();

        let remote = Plugin::from_descriptor(registry.get_plugins(None)[0].descriptor());
        registry.add_plugin(Some("other"), Arc::new(remote));
        registry.add_component(
            Some("other"),
            ComponentEntry::Remote(Arc::new(RemoteComponent::new("r1", "test.switch"))),
        );
        registry.remove_plugin(Some("other"), "test.switch");

        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn should_tear_down_components_before_plugins_on_close() {
        let (registry, transport) = setup(true);
        registry
            .create_component("s1", "test.switch", &serde_json::json!({}))
            .unwrap();
        let mut publisher = BusPublisher::start(&registry, transport.clone());
        transport.take_calls();

        publisher.close();
        publisher.close();

        assert_eq!(
            transport.take_calls(),
            vec![
                "remove_local_component s1",
                "clear_metadata plugins/test.switch",
            ]
        );

        registry.destroy_component("s1").unwrap();
        transport.set_online(false);
        transport.set_online(true);
        drop(publisher);
        assert!(transport.calls().is_empty());
    }
}
