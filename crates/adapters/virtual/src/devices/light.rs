//! Virtual light: on/off with a brightness level.

use plughub_app::builder::ModuleBuilder;
use plughub_domain::component::{ComponentConfig, StateWriter};
use plughub_domain::error::{ComponentError, TypeError};
use plughub_domain::plugin::{PluginInstance, Usage};
use plughub_domain::types::Type;

/// A simulated dimmable light.
///
/// Setting a brightness of `0` switches the light off; any other level
/// switches it on.
pub struct VirtualLight {
    component: String,
    switches: u64,
}

impl PluginInstance for VirtualLight {
    fn teardown(&mut self) {
        tracing::debug!(component = %self.component, switches = self.switches, "virtual light released");
    }
}

impl VirtualLight {
    fn create(_config: &ComponentConfig, states: &mut StateWriter<'_>) -> Result<Self, ComponentError> {
        Ok(Self {
            component: states.component_id().to_string(),
            switches: 0,
        })
    }

    fn set_on(&mut self, on: bool, states: &mut StateWriter<'_>) -> Result<(), ComponentError> {
        self.switches += 1;
        states.set("on", on)
    }

    fn set_brightness(
        &mut self,
        level: i64,
        states: &mut StateWriter<'_>,
    ) -> Result<(), ComponentError> {
        states.set("brightness", level)?;
        self.set_on(level > 0, states)
    }
}

pub(crate) fn declare(module: &mut ModuleBuilder<'_>) -> Result<(), TypeError> {
    let level = Type::range(0, 100)?;
    module
        .class("light", VirtualLight::create)
        .plugin(Usage::Actuator)
        .describe("Simulated dimmable light")
        .state("on", Type::Bool)
        .describe("Whether the light is on")
        .state_with_initial("brightness", level.clone(), 100)
        .describe("Brightness in percent")
        .action("setOn", Type::Bool, VirtualLight::set_on)
        .action("setBrightness", level, VirtualLight::set_brightness);
    Ok(())
}
