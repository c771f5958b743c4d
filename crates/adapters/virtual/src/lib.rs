//! # plughub-adapter-virtual
//!
//! Virtual driver module providing simulated devices for testing and
//! demonstration purposes.
//!
//! ## Provided plugins
//!
//! | Plugin | Usage | Behaviour |
//! |--------|-------|-----------|
//! | `virtual.light` | actuator | `setOn(bool)`, `setBrightness(range[0;100])` |
//! | `virtual.temperature` | sensor | Readings pushed with [`record_temperature`]; `unit` config |
//! | `virtual.relayBoard` | actuator | `setMask(uint8)` drives `relay1`..`relay4`; `outputs` config |
//!
//! ## Dependency rule
//!
//! Depends on `plughub-app` (builder, registry) and `plughub-domain` only.

mod devices;

use std::sync::Arc;

use plughub_app::builder::ModuleBuilder;
use plughub_app::registry::{ComponentEntry, Registry};
use plughub_domain::error::BuildError;
use plughub_domain::plugin::Plugin;

pub use devices::{VirtualLight, VirtualRelayBoard, VirtualSensor, record_temperature};

/// Module name; plugin ids are `virtual.<class>`.
pub const MODULE: &str = "virtual";

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the `virtual` module and register its plugins as local.
///
/// # Errors
///
/// Returns [`BuildError::ModuleAlreadyBuilt`] if it is already registered,
/// [`BuildError::ScopeAlreadyOpen`] while another module is being built, or
/// [`BuildError::InvalidType`] if a member type cannot be constructed.
#[tracing::instrument(skip(registry))]
pub fn build(registry: &Registry) -> Result<Vec<Arc<Plugin>>, BuildError> {
    let mut module = ModuleBuilder::begin(MODULE, VERSION, registry)?;
    devices::declare_all(&mut module)?;
    module.end()
}

/// Push a reading to every local `virtual.temperature` component.
///
/// Returns how many sensors accepted it.
pub fn tick_sensors(registry: &Registry, celsius: f64) -> usize {
    let sensor_id = Plugin::make_id(MODULE, "temperature");
    registry
        .get_components(None)
        .iter()
        .filter_map(ComponentEntry::as_local)
        .filter(|host| host.plugin().id == sensor_id)
        .filter(|host| match record_temperature(host, celsius) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(component = %host.id(), error = %err, "sensor reading rejected");
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughub_domain::value::Value;

    pub(crate) fn registry_with_module() -> Registry {
        let registry = Registry::new();
        build(&registry).unwrap();
        registry
    }

    #[test]
    fn should_register_three_plugins() {
        let registry = Registry::new();
        let plugins = build(&registry).unwrap();

        let mut ids: Vec<&str> = plugins.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(
            ids,
            vec!["virtual.light", "virtual.relayBoard", "virtual.temperature"]
        );
        assert!(plugins.iter().all(|p| p.module == MODULE));
    }

    #[test]
    fn should_refuse_building_twice() {
        let registry = registry_with_module();
        assert_eq!(
            build(&registry).unwrap_err(),
            BuildError::ModuleAlreadyBuilt {
                module: MODULE.to_string(),
            }
        );
    }

    #[test]
    fn should_publish_stable_light_descriptor() {
        let registry = registry_with_module();
        let light = registry.get_plugin(None, "virtual.light").unwrap();

        let descriptor = serde_json::to_value(light.descriptor()).unwrap();
        assert_eq!(descriptor["usage"], "actuator");
        assert_eq!(descriptor["members"]["brightness"]["valueType"], "range[0;100]");
        assert_eq!(descriptor["members"]["setOn"]["memberType"], "action");
    }

    #[test]
    fn should_tick_only_temperature_sensors() {
        let registry = registry_with_module();
        let sensor = registry
            .create_component("out", "virtual.temperature", &serde_json::json!({ "unit": "celsius" }))
            .unwrap();
        registry
            .create_component("hall", "virtual.light", &serde_json::json!({}))
            .unwrap();

        assert_eq!(tick_sensors(&registry, 18.0), 1);
        assert_eq!(sensor.state("temperature"), Some(Value::Number(18.0)));
    }
}
