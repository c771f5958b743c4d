//! Component host: binds a plugin to a configuration and manages live state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{ComponentConfig, StateWriter};
use crate::error::{ComponentError, ConfigurationError};
use crate::observer::{Observers, Subscription};
use crate::plugin::{AnyInstance, Implementation, Plugin};
use crate::value::{Value, json_kind};

/// A committed state write, as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub component: String,
    pub member: String,
    pub value: Value,
    pub at: DateTime<Utc>,
}

struct Live {
    instance: Option<Box<dyn AnyInstance>>,
    states: BTreeMap<String, Value>,
}

/// One live component. Shared as `Arc<ComponentHost>`.
pub struct ComponentHost {
    id: String,
    plugin: Arc<Plugin>,
    config: ComponentConfig,
    live: Mutex<Live>,
    observers: Observers<StateChange>,
}

impl ComponentHost {
    /// Validate `raw_config`, instantiate the plugin and initialise every state.
    ///
    /// Extra keys in `raw_config` are ignored.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::NotInstantiable`] for a plugin mirrored from another instance
    /// - [`ComponentError::Configuration`] for the first config entry failing its type
    /// - [`ComponentError::TypeMismatch`] for an invalid initial state value, a
    ///   type admitting no default value, or an invalid write performed by the factory
    /// - any error returned by the factory
    pub fn new(
        id: impl Into<String>,
        plugin: Arc<Plugin>,
        raw_config: &serde_json::Value,
    ) -> Result<Self, ComponentError> {
        let id = id.into();
        let implementation: &Implementation = plugin
            .implementation
            .as_ref()
            .ok_or_else(|| ComponentError::NotInstantiable(plugin.id.clone()))?;

        let config = validate_config(&id, &plugin, raw_config)?;

        let mut states = BTreeMap::new();
        for member in plugin.states() {
            let value = member
                .initial
                .clone()
                .unwrap_or_else(|| member.value_type.default_value());
            member.value_type.check(&value)?;
            states.insert(member.name.clone(), value);
        }

        let mut writer = StateWriter::new(&id, &plugin.members, &mut states);
        let instance = implementation.instantiate(&config, &mut writer);
        let (_, rejected) = writer.finish();
        if let Some(err) = rejected {
            if let Ok(mut instance) = instance {
                instance.teardown();
            }
            return Err(err.into());
        }
        let instance = instance?;

        Ok(Self {
            id,
            plugin,
            config,
            live: Mutex::new(Live {
                instance: Some(instance),
                states,
            }),
            observers: Observers::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }

    #[must_use]
    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    /// Snapshot of every state value.
    #[must_use]
    pub fn get_states(&self) -> BTreeMap<String, Value> {
        self.lock().states.clone()
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<Value> {
        self.lock().states.get(name).cloned()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lock().instance.is_none()
    }

    /// Observe committed state writes. Notifications are delivered after the
    /// action (or driver update) that produced them, in write order.
    pub fn subscribe_states(
        &self,
        listener: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.observers.subscribe(listener)
    }

    /// Validate `value` against action `name` and run its handler.
    ///
    /// # Errors
    ///
    /// - [`ComponentError::UnknownAction`] if `name` is not an action member
    /// - [`ComponentError::TypeMismatch`] if `value` fails the action's type
    ///   (the handler is not invoked), or if the handler performed an invalid
    ///   state write
    /// - [`ComponentError::Destroyed`] after [`destroy`](Self::destroy)
    /// - any error returned by the handler
    pub fn execute_action(&self, name: &str, value: Value) -> Result<(), ComponentError> {
        let unknown = || ComponentError::UnknownAction {
            component: self.id.clone(),
            action: name.to_string(),
        };
        let member = self
            .plugin
            .member(name)
            .filter(|m| m.is_action())
            .ok_or_else(unknown)?;
        member.value_type.check(&value)?;

        let implementation = self
            .plugin
            .implementation
            .as_ref()
            .ok_or_else(|| ComponentError::NotInstantiable(self.plugin.id.clone()))?;

        self.mutate(|instance, writer| {
            implementation
                .run_action(name, instance, &value, writer)
                .unwrap_or_else(|| Err(unknown()))
        })
    }

    /// Let driver code update state from outside an action (e.g. a sensor
    /// reading arriving from hardware). Writes are validated like any other.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Destroyed`] after [`destroy`](Self::destroy),
    /// or whatever `update` returns; an invalid write always surfaces as
    /// [`ComponentError::TypeMismatch`].
    pub fn update<F>(&self, update: F) -> Result<(), ComponentError>
    where
        F: FnOnce(&mut StateWriter<'_>) -> Result<(), ComponentError>,
    {
        self.mutate(|_, writer| update(writer))
    }

    /// Run the instance teardown hook (once) and release observers.
    pub fn destroy(&self) {
        let instance = self.lock().instance.take();
        if let Some(mut instance) = instance {
            instance.teardown();
        }
        self.observers.clear();
    }

    fn mutate<F>(&self, apply: F) -> Result<(), ComponentError>
    where
        F: FnOnce(&mut dyn AnyInstance, &mut StateWriter<'_>) -> Result<(), ComponentError>,
    {
        let (result, changes, rejected) = {
            let mut guard = self.lock();
            let Live { instance, states } = &mut *guard;
            let instance = instance
                .as_mut()
                .ok_or_else(|| ComponentError::Destroyed(self.id.clone()))?;
            let mut writer = StateWriter::new(&self.id, &self.plugin.members, states);
            let result = apply(&mut **instance, &mut writer);
            let (changes, rejected) = writer.finish();
            (result, changes, rejected)
        };

        let at = Utc::now();
        for (member, value) in changes {
            self.observers.emit(&StateChange {
                component: self.id.clone(),
                member,
                value,
                at,
            });
        }

        match rejected {
            Some(err) => Err(err.into()),
            None => result,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ComponentHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHost")
            .field("id", &self.id)
            .field("plugin", &self.plugin.id)
            .finish_non_exhaustive()
    }
}

fn validate_config(
    id: &str,
    plugin: &Plugin,
    raw: &serde_json::Value,
) -> Result<ComponentConfig, ConfigurationError> {
    let mut values = BTreeMap::new();
    for entry in plugin.config.values() {
        let raw_value = raw.get(&entry.name);
        let value = raw_value
            .and_then(Value::from_json)
            .filter(|v| entry.value_type.validate(v))
            .ok_or_else(|| ConfigurationError {
                component: id.to_string(),
                plugin: plugin.id.clone(),
                entry: entry.name.clone(),
                expected: entry.value_type.display_name(),
                actual: json_kind(raw_value).to_string(),
            })?;
        values.insert(entry.name.clone(), value);
    }
    Ok(ComponentConfig::new(values))
}
