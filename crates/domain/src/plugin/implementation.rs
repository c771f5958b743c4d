//! Type-erased plugin implementation: a factory plus one handler per action.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::component::{ComponentConfig, StateWriter};
use crate::error::ComponentError;
use crate::value::{PrimitiveValue, Value};

/// Driver-side object backing a component.
///
/// `teardown` is called exactly once when the component is destroyed.
pub trait PluginInstance: Send + 'static {
    fn teardown(&mut self) {}
}

/// Object-safe view of a [`PluginInstance`].
pub trait AnyInstance: Send {
    fn as_any_mut(&mut self) -> &mut (dyn Any + 'static);
    fn teardown(&mut self);
}

impl<T: PluginInstance> AnyInstance for T {
    fn as_any_mut(&mut self) -> &mut (dyn Any + 'static) {
        self
    }

    fn teardown(&mut self) {
        PluginInstance::teardown(self);
    }
}

type FactoryFn = dyn Fn(&ComponentConfig, &mut StateWriter<'_>) -> Result<Box<dyn AnyInstance>, ComponentError>
    + Send
    + Sync;

type ActionFn = dyn Fn(&mut dyn AnyInstance, &Value, &mut StateWriter<'_>) -> Result<(), ComponentError>
    + Send
    + Sync;

/// Factory and action handlers of a local plugin.
#[derive(Clone)]
pub struct Implementation {
    factory: Arc<FactoryFn>,
    actions: HashMap<String, Arc<ActionFn>>,
}

impl Implementation {
    /// Start an implementation for instances of `T`.
    pub fn builder<T, F>(factory: F) -> ImplementationBuilder<T>
    where
        T: PluginInstance,
        F: Fn(&ComponentConfig, &mut StateWriter<'_>) -> Result<T, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        ImplementationBuilder {
            factory: Arc::new(
                move |config: &ComponentConfig, states: &mut StateWriter<'_>| {
                    factory(config, states)
                        .map(|instance| Box::new(instance) as Box<dyn AnyInstance>)
                },
            ),
            actions: HashMap::new(),
            _instance: PhantomData,
        }
    }

    pub(crate) fn instantiate(
        &self,
        config: &ComponentConfig,
        states: &mut StateWriter<'_>,
    ) -> Result<Box<dyn AnyInstance>, ComponentError> {
        (self.factory)(config, states)
    }

    pub(crate) fn run_action(
        &self,
        name: &str,
        instance: &mut dyn AnyInstance,
        value: &Value,
        states: &mut StateWriter<'_>,
    ) -> Option<Result<(), ComponentError>> {
        self.actions
            .get(name)
            .map(|handler| handler(instance, value, states))
    }

    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        actions.sort_unstable();
        f.debug_struct("Implementation")
            .field("actions", &actions)
            .finish_non_exhaustive()
    }
}

/// Typed builder; guarantees every handler targets the factory's instance type.
pub struct ImplementationBuilder<T> {
    factory: Arc<FactoryFn>,
    actions: HashMap<String, Arc<ActionFn>>,
    _instance: PhantomData<fn() -> T>,
}

impl<T: PluginInstance> ImplementationBuilder<T> {
    /// Bind the handler of action `name`. `P` is the handler's parameter.
    #[must_use]
    pub fn action<P, H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        P: PrimitiveValue,
        H: Fn(&mut T, P, &mut StateWriter<'_>) -> Result<(), ComponentError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let action = name.clone();
        let erased = move |instance: &mut dyn AnyInstance,
                           value: &Value,
                           states: &mut StateWriter<'_>| {
            let target = instance.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
                ComponentError::driver(format!("action '{action}' bound to a foreign instance"))
            })?;
            let param = P::from_value(value).ok_or_else(|| {
                ComponentError::driver(format!(
                    "action '{action}' cannot take a {} parameter",
                    value.primitive()
                ))
            })?;
            handler(target, param, states)
        };
        self.actions.insert(name, Arc::new(erased));
        self
    }

    #[must_use]
    pub fn build(self) -> Implementation {
        Implementation {
            factory: self.factory,
            actions: self.actions,
        }
    }
}
