//! Plugin: the immutable, typed template a component is instantiated from.
//!
//! A plugin declares its configuration schema ([`ConfigEntry`]) and its
//! members ([`Member`]): observable states and invocable actions, each bound
//! to a [`Type`]. Local plugins carry an [`Implementation`]; plugins mirrored
//! from other instances are described only by their wire descriptor.

mod descriptor;
mod implementation;

pub use descriptor::{ComponentDescriptor, ConfigDescriptor, MemberDescriptor, PluginDescriptor};
pub use implementation::{AnyInstance, Implementation, ImplementationBuilder, PluginInstance};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Type;
use crate::value::Value;

/// What a plugin is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usage {
    Sensor,
    Actuator,
    Logic,
    Ui,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sensor => "sensor",
            Self::Actuator => "actuator",
            Self::Logic => "logic",
            Self::Ui => "ui",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// Externally observable, internally read/write.
    State,
    /// Externally invocable, handled by a callback taking one value.
    Action,
}

/// A named state or action of a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    pub value_type: Type,
    pub description: Option<String>,
    /// Initial value of a state member; validated when a component is built.
    pub initial: Option<Value>,
}

impl Member {
    #[must_use]
    pub fn state(name: impl Into<String>, value_type: Type) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::State,
            value_type,
            description: None,
            initial: None,
        }
    }

    #[must_use]
    pub fn action(name: impl Into<String>, value_type: Type) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Action,
            value_type,
            description: None,
            initial: None,
        }
    }

    #[must_use]
    pub fn is_state(&self) -> bool {
        self.kind == MemberKind::State
    }

    #[must_use]
    pub fn is_action(&self) -> bool {
        self.kind == MemberKind::Action
    }
}

/// One required construction parameter of a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub name: String,
    pub value_type: Type,
    pub description: Option<String>,
}

/// Immutable plugin descriptor. Shared as `Arc<Plugin>` once built.
#[derive(Debug, Clone)]
pub struct Plugin {
    /// `module.name`
    pub id: String,
    pub name: String,
    pub module: String,
    pub version: String,
    pub usage: Usage,
    pub description: Option<String>,
    pub members: BTreeMap<String, Member>,
    pub config: BTreeMap<String, ConfigEntry>,
    /// `None` for plugins mirrored from another instance.
    pub implementation: Option<Implementation>,
}

impl Plugin {
    /// Canonical plugin id.
    #[must_use]
    pub fn make_id(module: &str, name: &str) -> String {
        format!("{module}.{name}")
    }

    pub fn states(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| m.is_state())
    }

    pub fn actions(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| m.is_action())
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Wire descriptor published to the bus under `plugins/<id>`.
    #[must_use]
    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: self.name.clone(),
            module: self.module.clone(),
            version: self.version.clone(),
            usage: self.usage,
            description: self.description.clone(),
            members: self
                .members
                .values()
                .map(|m| {
                    (
                        m.name.clone(),
                        MemberDescriptor {
                            member_type: m.kind,
                            value_type: m.value_type.clone(),
                            description: m.description.clone(),
                        },
                    )
                })
                .collect(),
            config: self
                .config
                .values()
                .map(|c| {
                    (
                        c.name.clone(),
                        ConfigDescriptor {
                            value_type: c.value_type.clone(),
                            description: c.description.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Rebuild a plugin from a descriptor published by another instance.
    ///
    /// The result has no implementation and cannot be instantiated here.
    #[must_use]
    pub fn from_descriptor(descriptor: PluginDescriptor) -> Self {
        let PluginDescriptor {
            name,
            module,
            version,
            usage,
            description,
            members,
            config,
        } = descriptor;
        Self {
            id: Self::make_id(&module, &name),
            members: members
                .into_iter()
                .map(|(member_name, m)| {
                    let member = Member {
                        name: member_name.clone(),
                        kind: m.member_type,
                        value_type: m.value_type,
                        description: m.description,
                        initial: None,
                    };
                    (member_name, member)
                })
                .collect(),
            config: config
                .into_iter()
                .map(|(entry_name, c)| {
                    let entry = ConfigEntry {
                        name: entry_name.clone(),
                        value_type: c.value_type,
                        description: c.description,
                    };
                    (entry_name, entry)
                })
                .collect(),
            name,
            module,
            version,
            usage,
            description,
            implementation: None,
        }
    }
}
