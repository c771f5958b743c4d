//! Virtual temperature sensor: readings are pushed by the driver.

use plughub_app::builder::ModuleBuilder;
use plughub_domain::component::{ComponentConfig, ComponentHost, StateWriter};
use plughub_domain::error::{ComponentError, TypeError};
use plughub_domain::plugin::{PluginInstance, Usage};
use plughub_domain::types::Type;

const FAHRENHEIT: &str = "fahrenheit";

/// A simulated temperature sensor.
///
/// Sensors expose no actions; [`record_temperature`] feeds them readings.
pub struct VirtualSensor;

impl PluginInstance for VirtualSensor {}

impl VirtualSensor {
    fn create(config: &ComponentConfig, states: &mut StateWriter<'_>) -> Result<Self, ComponentError> {
        let unit = config.text("unit").unwrap_or("celsius");
        let symbol = if unit == FAHRENHEIT { "\u{b0}F" } else { "\u{b0}C" };
        states.set("unit", symbol)?;
        Ok(Self)
    }
}

/// Store a reading given in degrees Celsius, converted to the sensor's unit.
///
/// # Errors
///
/// Propagates the component's error, e.g. once it has been destroyed.
pub fn record_temperature(sensor: &ComponentHost, celsius: f64) -> Result<(), ComponentError> {
    let value = if sensor.config().text("unit") == Some(FAHRENHEIT) {
        celsius * 9.0 / 5.0 + 32.0
    } else {
        celsius
    };
    sensor.update(|states| states.set("temperature", value))
}

pub(crate) fn declare(module: &mut ModuleBuilder<'_>) -> Result<(), TypeError> {
    let unit = Type::enumeration(["celsius", FAHRENHEIT])?;
    module
        .class("temperature", VirtualSensor::create)
        .plugin(Usage::Sensor)
        .describe("Simulated temperature sensor")
        .config("unit", unit)
        .describe("Unit readings are reported in")
        .state_with_initial("temperature", Type::Float, 21.5)
        .state("unit", Type::Text)
        .describe("Unit symbol");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::registry_with_module;
    use plughub_domain::value::Value;

    #[test]
    fn should_report_initial_reading() {
        let registry = registry_with_module();
        let sensor = registry
            .create_component("out", "virtual.temperature", &serde_json::json!({ "unit": "celsius" }))
            .unwrap();

        assert_eq!(sensor.state("temperature"), Some(Value::Number(21.5)));
        assert_eq!(sensor.state("unit"), Some(Value::Text("\u{b0}C".to_string())));
    }

    #[test]
    fn should_convert_reading_to_configured_unit() {
        let registry = registry_with_module();
        let sensor = registry
            .create_component(
                "out",
                "virtual.temperature",
                &serde_json::json!({ "unit": "fahrenheit" }),
            )
            .unwrap();

        record_temperature(&sensor, 100.0).unwrap();

        assert_eq!(sensor.state("temperature"), Some(Value::Number(212.0)));
    }

    #[test]
    fn should_reject_unknown_unit() {
        let registry = registry_with_module();
        let err = registry
            .create_component("out", "virtual.temperature", &serde_json::json!({ "unit": "kelvin" }))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Invalid configuration for component 'out' of plugin 'virtual.temperature' for configuration entry 'unit': expected type 'enum[celsius,fahrenheit]' but got 'string'"
        );
    }

    #[test]
    fn should_refuse_reading_after_destroy() {
        let registry = registry_with_module();
        let sensor = registry
            .create_component("out", "virtual.temperature", &serde_json::json!({ "unit": "celsius" }))
            .unwrap();
        registry.destroy_component("out").unwrap();

        assert!(matches!(
            record_temperature(&sensor, 20.0),
            Err(ComponentError::Destroyed(_))
        ));
    }
}
