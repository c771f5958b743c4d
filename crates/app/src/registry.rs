//! Registry: catalog of plugins and components, local and remote.
//!
//! Entries are keyed by `(instance, id)` where `instance == None` means
//! "owned by this process". The registry never creates or mutates
//! components on its own; it tracks them and notifies listeners, in call
//! order, of every add and remove. Drivers may use the
//! [`create_component`](Registry::create_component) /
//! [`destroy_component`](Registry::destroy_component) conveniences, which
//! construct the [`ComponentHost`] first and register it afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use plughub_domain::component::ComponentHost;
use plughub_domain::error::{BuildError, HubError, NotFoundError};
use plughub_domain::observer::{Observers, Subscription};
use plughub_domain::plugin::Plugin;
use plughub_domain::value::Value;

type Key = (Option<String>, String);

fn key(instance: Option<&str>, id: &str) -> Key {
    (instance.map(str::to_string), id.to_string())
}

/// A component owned by another instance, mirrored from the bus.
#[derive(Debug)]
pub struct RemoteComponent {
    id: String,
    plugin_id: String,
    states: Mutex<BTreeMap<String, Value>>,
}

impl RemoteComponent {
    #[must_use]
    pub fn new(id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin_id: plugin_id.into(),
            states: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Record the latest value seen on the bus.
    pub fn set_state(&self, name: impl Into<String>, value: Value) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }

    #[must_use]
    pub fn get_states(&self) -> BTreeMap<String, Value> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A registered component.
#[derive(Debug, Clone)]
pub enum ComponentEntry {
    Local(Arc<ComponentHost>),
    Remote(Arc<RemoteComponent>),
}

impl ComponentEntry {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Local(host) => host.id(),
            Self::Remote(remote) => remote.id(),
        }
    }

    #[must_use]
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::Local(host) => &host.plugin().id,
            Self::Remote(remote) => remote.plugin_id(),
        }
    }

    #[must_use]
    pub fn get_states(&self) -> BTreeMap<String, Value> {
        match self {
            Self::Local(host) => host.get_states(),
            Self::Remote(remote) => remote.get_states(),
        }
    }

    #[must_use]
    pub fn as_local(&self) -> Option<&Arc<ComponentHost>> {
        match self {
            Self::Local(host) => Some(host),
            Self::Remote(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PluginEvent {
    Added {
        instance: Option<String>,
        plugin: Arc<Plugin>,
    },
    Removed {
        instance: Option<String>,
        plugin: Arc<Plugin>,
    },
}

#[derive(Debug, Clone)]
pub enum ComponentEvent {
    Added {
        instance: Option<String>,
        component: ComponentEntry,
    },
    Removed {
        instance: Option<String>,
        component: ComponentEntry,
    },
}

/// Snapshot row returned by [`Registry::get_components_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentData {
    pub instance: Option<String>,
    pub id: String,
    pub plugin_id: String,
    pub states: BTreeMap<String, Value>,
}

#[derive(Default)]
struct Catalog {
    plugins: BTreeMap<Key, Arc<Plugin>>,
    components: BTreeMap<Key, ComponentEntry>,
}

#[derive(Default)]
struct BuildState {
    open: Option<String>,
    built: BTreeSet<String>,
}

/// In-process catalog shared as `Arc<Registry>`.
#[derive(Default)]
pub struct Registry {
    catalog: Mutex<Catalog>,
    build: Mutex<BuildState>,
    plugin_events: Observers<PluginEvent>,
    component_events: Observers<ComponentEvent>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- plugins ------------------------------------------------------------

    /// Register a plugin; an existing entry with the same key is replaced.
    pub fn add_plugin(&self, instance: Option<&str>, plugin: Arc<Plugin>) {
        self.lock()
            .plugins
            .insert(key(instance, &plugin.id), Arc::clone(&plugin));
        tracing::debug!(instance = ?instance, plugin = %plugin.id, "plugin added");
        self.plugin_events.emit(&PluginEvent::Added {
            instance: instance.map(str::to_string),
            plugin,
        });
    }

    /// Unregister a plugin. Unknown keys are ignored without an event.
    pub fn remove_plugin(&self, instance: Option<&str>, id: &str) -> Option<Arc<Plugin>> {
        let removed = self.lock().plugins.remove(&key(instance, id))?;
        tracing::debug!(instance = ?instance, plugin = %id, "plugin removed");
        self.plugin_events.emit(&PluginEvent::Removed {
            instance: instance.map(str::to_string),
            plugin: Arc::clone(&removed),
        });
        Some(removed)
    }

    #[must_use]
    pub fn get_plugin(&self, instance: Option<&str>, id: &str) -> Option<Arc<Plugin>> {
        self.lock().plugins.get(&key(instance, id)).cloned()
    }

    #[must_use]
    pub fn get_plugins(&self, instance: Option<&str>) -> Vec<Arc<Plugin>> {
        self.lock()
            .plugins
            .iter()
            .filter(|((owner, _), _)| owner.as_deref() == instance)
            .map(|(_, plugin)| Arc::clone(plugin))
            .collect()
    }

    // -- components ---------------------------------------------------------

    /// Register a component; an existing entry with the same key is replaced.
    pub fn add_component(&self, instance: Option<&str>, component: ComponentEntry) {
        self.lock()
            .components
            .insert(key(instance, component.id()), component.clone());
        tracing::debug!(instance = ?instance, component = %component.id(), "component added");
        self.component_events.emit(&ComponentEvent::Added {
            instance: instance.map(str::to_string),
            component,
        });
    }

    /// Unregister a component. Unknown keys are ignored without an event.
    pub fn remove_component(&self, instance: Option<&str>, id: &str) -> Option<ComponentEntry> {
        let removed = self.lock().components.remove(&key(instance, id))?;
        tracing::debug!(instance = ?instance, component = %id, "component removed");
        self.component_events.emit(&ComponentEvent::Removed {
            instance: instance.map(str::to_string),
            component: removed.clone(),
        });
        Some(removed)
    }

    /// Local component by id.
    #[must_use]
    pub fn get_component(&self, id: &str) -> Option<Arc<ComponentHost>> {
        self.lock()
            .components
            .get(&key(None, id))
            .and_then(ComponentEntry::as_local)
            .cloned()
    }

    #[must_use]
    pub fn get_components(&self, instance: Option<&str>) -> Vec<ComponentEntry> {
        self.lock()
            .components
            .iter()
            .filter(|((owner, _), _)| owner.as_deref() == instance)
            .map(|(_, component)| component.clone())
            .collect()
    }

    /// Snapshot of every component, local and remote, with its states.
    #[must_use]
    pub fn get_components_data(&self) -> Vec<ComponentData> {
        let entries: Vec<(Option<String>, ComponentEntry)> = self
            .lock()
            .components
            .iter()
            .map(|((owner, _), component)| (owner.clone(), component.clone()))
            .collect();
        entries
            .into_iter()
            .map(|(instance, component)| ComponentData {
                instance,
                id: component.id().to_string(),
                plugin_id: component.plugin_id().to_string(),
                states: component.get_states(),
            })
            .collect()
    }

    /// Names of the remote instances that currently own at least one entry.
    #[must_use]
    pub fn get_instance_names(&self) -> Vec<String> {
        let catalog = self.lock();
        let names: BTreeSet<String> = catalog
            .plugins
            .keys()
            .chain(catalog.components.keys())
            .filter_map(|(owner, _)| owner.clone())
            .collect();
        names.into_iter().collect()
    }

    // -- driver conveniences -------------------------------------------------

    /// Instantiate local plugin `plugin_id` as component `id` and register it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for an unknown plugin,
    /// [`HubError::AlreadyExists`] if a local component `id` is registered,
    /// or the [`ComponentError`](plughub_domain::error::ComponentError) raised
    /// while constructing the host.
    #[tracing::instrument(skip(self, raw_config))]
    pub fn create_component(
        &self,
        id: &str,
        plugin_id: &str,
        raw_config: &serde_json::Value,
    ) -> Result<Arc<ComponentHost>, HubError> {
        let plugin = self.get_plugin(None, plugin_id).ok_or_else(|| NotFoundError {
            kind: "Plugin",
            id: plugin_id.to_string(),
        })?;
        if self.get_component(id).is_some() {
            return Err(HubError::AlreadyExists(id.to_string()));
        }
        let host = Arc::new(ComponentHost::new(id, plugin, raw_config)?);
        self.add_component(None, ComponentEntry::Local(Arc::clone(&host)));
        tracing::info!(component = %id, plugin = %plugin_id, "component created");
        Ok(host)
    }

    /// Unregister local component `id`, then destroy it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] if no such local component exists.
    #[tracing::instrument(skip(self))]
    pub fn destroy_component(&self, id: &str) -> Result<(), HubError> {
        let entry = self.remove_component(None, id).ok_or_else(|| NotFoundError {
            kind: "Component",
            id: id.to_string(),
        })?;
        if let ComponentEntry::Local(host) = entry {
            host.destroy();
        }
        tracing::info!(component = %id, "component destroyed");
        Ok(())
    }

    // -- listeners ----------------------------------------------------------

    pub fn subscribe_plugins(
        &self,
        listener: impl Fn(&PluginEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.plugin_events.subscribe(listener)
    }

    pub fn subscribe_components(
        &self,
        listener: impl Fn(&ComponentEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.component_events.subscribe(listener)
    }

    /// Release every listener. Entries are left in place; tearing them down
    /// is each owner's responsibility.
    pub fn close(&self) {
        self.plugin_events.clear();
        self.component_events.clear();
    }

    // -- module build bookkeeping -------------------------------------------

    pub(crate) fn open_build_scope(&self, module: &str) -> Result<(), BuildError> {
        let mut build = self.lock_build();
        if let Some(open) = &build.open {
            return Err(BuildError::ScopeAlreadyOpen {
                module: module.to_string(),
                open: open.clone(),
            });
        }
        if build.built.contains(module) {
            return Err(BuildError::ModuleAlreadyBuilt {
                module: module.to_string(),
            });
        }
        build.open = Some(module.to_string());
        Ok(())
    }

    pub(crate) fn close_build_scope(&self, module: &str, built: bool) {
        let mut build = self.lock_build();
        if build.open.as_deref() == Some(module) {
            build.open = None;
        }
        if built {
            build.built.insert(module.to_string());
        }
    }

    /// Whether `module` has been built and not unloaded since.
    #[must_use]
    pub fn is_module_built(&self, module: &str) -> bool {
        self.lock_build().built.contains(module)
    }

    /// Remove every local plugin of `module` so it can be built again.
    ///
    /// Returns the number of plugins removed.
    pub fn unload_module(&self, module: &str) -> usize {
        let ids: Vec<String> = self
            .get_plugins(None)
            .into_iter()
            .filter(|plugin| plugin.module == module)
            .map(|plugin| plugin.id.clone())
            .collect();
        for id in &ids {
            self.remove_plugin(None, id);
        }
        self.lock_build().built.remove(module);
        tracing::info!(module, plugins = ids.len(), "module unloaded");
        ids.len()
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_build(&self) -> MutexGuard<'_, BuildState> {
        self.build.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
