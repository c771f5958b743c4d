//! Component: one live instance of a plugin bound to a validated configuration.
//!
//! [`ComponentHost`] is the only component implementation. It owns the state
//! table and the driver instance, and enforces type validity on every write:
//! configuration at construction, action arguments before the handler runs,
//! and state writes at the point of assignment through [`StateWriter`].

mod host;
mod writer;

pub use host::{ComponentHost, StateChange};
pub use writer::StateWriter;

use std::collections::BTreeMap;

use crate::value::Value;

/// Configuration of a component, validated against its plugin's schema.
///
/// Only declared entries are kept; extra raw keys are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentConfig {
    values: BTreeMap<String, Value>,
}

impl ComponentConfig {
    pub(crate) fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }
}
