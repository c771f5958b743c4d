//! Module builder: turns typed class declarations into registered plugins.
//!
//! A driver module opens a scope with [`ModuleBuilder::begin`], declares its
//! classes, and calls [`ModuleBuilder::end`]. Declarations are checked as a
//! whole at `end`: on the first structural error nothing is registered.
//!
//! ```ignore
//! let mut module = ModuleBuilder::begin("virtual", "1.0.0", &registry)?;
//! module
//!     .class("Light", Light::create)
//!     .plugin(Usage::Actuator)
//!     .state("on", Type::Bool)
//!     .action("toggle", Type::Bool, Light::toggle);
//! let plugins = module.end()?;
//! ```

use std::mem;
use std::sync::Arc;

use plughub_domain::component::{ComponentConfig, StateWriter};
use plughub_domain::error::{BuildError, ComponentError};
use plughub_domain::plugin::{
    ConfigEntry, Implementation, ImplementationBuilder, Member, Plugin, PluginInstance, Usage,
};
use plughub_domain::types::Type;
use plughub_domain::value::{PrimitiveValue, Value};

use crate::registry::Registry;

struct PendingClass {
    class: String,
    usage: Option<Usage>,
    name: Option<String>,
    description: Option<String>,
    members: Vec<Member>,
    config: Vec<ConfigEntry>,
    implementation: Implementation,
    errors: Vec<BuildError>,
}

/// Open build scope of one module.
pub struct ModuleBuilder<'r> {
    registry: &'r Registry,
    module: String,
    version: String,
    classes: Vec<PendingClass>,
    built: bool,
}

impl<'r> ModuleBuilder<'r> {
    /// Open the build scope of `module`.
    ///
    /// # Errors
    ///
    /// [`BuildError::ScopeAlreadyOpen`] while another module is being built,
    /// [`BuildError::ModuleAlreadyBuilt`] if `module` was built and not unloaded.
    pub fn begin(
        module: impl Into<String>,
        version: impl Into<String>,
        registry: &'r Registry,
    ) -> Result<Self, BuildError> {
        let module = module.into();
        registry.open_build_scope(&module)?;
        tracing::debug!(module = %module, "module build started");
        Ok(Self {
            registry,
            module,
            version: version.into(),
            classes: Vec::new(),
            built: false,
        })
    }

    /// Remove the plugins of a built module so it can be built again.
    pub fn unload(module: &str, registry: &Registry) -> usize {
        registry.unload_module(module)
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Declare a candidate class whose instances are created by `factory`.
    ///
    /// The declaration is recorded when the returned builder is dropped.
    pub fn class<T, F>(&mut self, class: impl Into<String>, factory: F) -> ClassBuilder<'_, 'r, T>
    where
        T: PluginInstance,
        F: Fn(&ComponentConfig, &mut StateWriter<'_>) -> Result<T, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        ClassBuilder {
            module: self,
            class: class.into(),
            usage: None,
            name: None,
            description: None,
            members: Vec::new(),
            config: Vec::new(),
            implementation: Some(Implementation::builder(factory)),
            errors: Vec::new(),
            last: Described::Plugin,
        }
    }

    /// Validate every declared class and register the resulting plugins as
    /// local, in declaration order.
    ///
    /// # Errors
    ///
    /// The first [`BuildError`] found; no plugin is registered in that case.
    pub fn end(mut self) -> Result<Vec<Arc<Plugin>>, BuildError> {
        let classes = mem::take(&mut self.classes);
        let mut plugins: Vec<Arc<Plugin>> = Vec::with_capacity(classes.len());

        for class in classes {
            if let Some(err) = class.errors.into_iter().next() {
                return Err(err);
            }
            let Some(usage) = class.usage else {
                if class.members.is_empty() && class.config.is_empty() {
                    tracing::debug!(class = %class.class, "class skipped: not a plugin");
                    continue;
                }
                return Err(BuildError::MissingPluginDeclaration { class: class.class });
            };

            let name = class.name.unwrap_or(class.class);
            let id = Plugin::make_id(&self.module, &name);
            if plugins.iter().any(|p| p.id == id) || self.registry.get_plugin(None, &id).is_some()
            {
                return Err(BuildError::DuplicatePlugin { id });
            }

            plugins.push(Arc::new(Plugin {
                id,
                name,
                module: self.module.clone(),
                version: self.version.clone(),
                usage,
                description: class.description,
                members: class
                    .members
                    .into_iter()
                    .map(|m| (m.name.clone(), m))
                    .collect(),
                config: class
                    .config
                    .into_iter()
                    .map(|c| (c.name.clone(), c))
                    .collect(),
                implementation: Some(class.implementation),
            }));
        }

        for plugin in &plugins {
            self.registry.add_plugin(None, Arc::clone(plugin));
        }
        self.built = true;
        tracing::info!(
            module = %self.module,
            version = %self.version,
            plugins = plugins.len(),
            "module built"
        );
        Ok(plugins)
    }
}

impl Drop for ModuleBuilder<'_> {
    fn drop(&mut self) {
        self.registry.close_build_scope(&self.module, self.built);
    }
}

enum Described {
    Plugin,
    Member(usize),
    Config(usize),
    /// The last declaration was rejected.
    Rejected,
}

/// Declarations of one class. Commits itself to the module on drop.
pub struct ClassBuilder<'m, 'r, T: PluginInstance> {
    module: &'m mut ModuleBuilder<'r>,
    class: String,
    usage: Option<Usage>,
    name: Option<String>,
    description: Option<String>,
    members: Vec<Member>,
    config: Vec<ConfigEntry>,
    implementation: Option<ImplementationBuilder<T>>,
    errors: Vec<BuildError>,
    last: Described,
}

impl<T: PluginInstance> ClassBuilder<'_, '_, T> {
    /// Top-level plugin declaration. Without it, a class that declares
    /// members fails the build.
    pub fn plugin(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self.last = Described::Plugin;
        self
    }

    /// Plugin name; defaults to the class name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Describe the most recent declaration (the plugin itself, a member or
    /// a configuration entry).
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match self.last {
            Described::Plugin => self.description = text,
            Described::Member(index) => self.members[index].description = text,
            Described::Config(index) => self.config[index].description = text,
            Described::Rejected => {}
        }
        self
    }

    pub fn config(mut self, name: impl Into<String>, value_type: Type) -> Self {
        let name = name.into();
        if self.config.iter().any(|c| c.name == name) {
            self.duplicate(&name);
            return self;
        }
        self.config.push(ConfigEntry {
            name,
            value_type,
            description: None,
        });
        self.last = Described::Config(self.config.len() - 1);
        self
    }

    /// State initialised to the type's default.
    pub fn state(self, name: impl Into<String>, value_type: Type) -> Self {
        self.push_member(Member::state(name, value_type))
    }

    pub fn state_with_initial(
        self,
        name: impl Into<String>,
        value_type: Type,
        initial: impl Into<Value>,
    ) -> Self {
        let mut member = Member::state(name, value_type);
        member.initial = Some(initial.into());
        self.push_member(member)
    }

    /// Action whose argument is validated against `value_type` and handed to
    /// `handler` as `P`. The primitive of `P` must match the type's.
    pub fn action<P, H>(mut self, name: impl Into<String>, value_type: Type, handler: H) -> Self
    where
        P: PrimitiveValue,
        H: Fn(&mut T, P, &mut StateWriter<'_>) -> Result<(), ComponentError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if value_type.primitive() != P::PRIMITIVE {
            self.errors.push(BuildError::ActionPrimitiveMismatch {
                action: name.clone(),
                class: self.class.clone(),
                expected: value_type.primitive().to_string(),
                actual: P::PRIMITIVE.to_string(),
            });
        } else if !self.members.iter().any(|m| m.name == name) {
            self.implementation = self
                .implementation
                .take()
                .map(|implementation| implementation.action(name.clone(), handler));
        }
        self.push_member(Member::action(name, value_type))
    }

    fn push_member(mut self, member: Member) -> Self {
        if self.members.iter().any(|m| m.name == member.name) {
            self.duplicate(&member.name);
            return self;
        }
        self.members.push(member);
        self.last = Described::Member(self.members.len() - 1);
        self
    }

    fn duplicate(&mut self, member: &str) {
        self.last = Described::Rejected;
        self.errors.push(BuildError::DuplicateMember {
            member: member.to_string(),
            class: self.class.clone(),
        });
    }
}

impl<T: PluginInstance> Drop for ClassBuilder<'_, '_, T> {
    fn drop(&mut self) {
        let Some(implementation) = self.implementation.take() else {
            return;
        };
        self.module.classes.push(PendingClass {
            class: mem::take(&mut self.class),
            usage: self.usage,
            name: self.name.take(),
            description: self.description.take(),
            members: mem::take(&mut self.members),
            config: mem::take(&mut self.config),
            implementation: implementation.build(),
            errors: mem::take(&mut self.errors),
        });
    }
}
