//! Validated write access to a component's state table.

use std::collections::BTreeMap;

use crate::error::{ComponentError, TypeMismatchError};
use crate::plugin::Member;
use crate::value::Value;

/// Handed to factories and action handlers; the only way to change state.
///
/// A write is checked against the member's type *before* it is committed:
/// a rejected write leaves the previous value in place. Writes that were
/// accepted earlier in the same call stay committed. The first rejection is
/// remembered, so the enclosing construction or action fails even if the
/// handler ignores the returned error.
pub struct StateWriter<'a> {
    component: &'a str,
    members: &'a BTreeMap<String, Member>,
    values: &'a mut BTreeMap<String, Value>,
    changes: Vec<(String, Value)>,
    rejected: Option<TypeMismatchError>,
}

impl<'a> StateWriter<'a> {
    pub(crate) fn new(
        component: &'a str,
        members: &'a BTreeMap<String, Member>,
        values: &'a mut BTreeMap<String, Value>,
    ) -> Self {
        Self {
            component,
            members,
            values,
            changes: Vec::new(),
            rejected: None,
        }
    }

    /// Assign a state member.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::UnknownState`] if `name` is not a state of
    /// the plugin, or [`ComponentError::TypeMismatch`] if the value fails the
    /// member's type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ComponentError> {
        let value = value.into();
        let member = self
            .members
            .get(name)
            .filter(|m| m.is_state())
            .ok_or_else(|| ComponentError::UnknownState {
                component: self.component.to_string(),
                state: name.to_string(),
            })?;

        if let Err(err) = member.value_type.check(&value) {
            self.rejected.get_or_insert_with(|| err.clone());
            return Err(err.into());
        }

        if self.values.get(name) != Some(&value) {
            self.values.insert(name.to_string(), value.clone());
            self.changes.push((name.to_string(), value));
        }
        Ok(())
    }

    /// Current value of a state member.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[must_use]
    pub fn component_id(&self) -> &str {
        self.component
    }

    /// Committed changes in write order, and the first rejected write.
    pub(crate) fn finish(self) -> (Vec<(String, Value)>, Option<TypeMismatchError>) {
        (self.changes, self.rejected)
    }
}
