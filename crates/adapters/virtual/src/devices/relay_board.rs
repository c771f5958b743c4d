//! Virtual relay board: up to four outputs driven by one bit mask.

use plughub_app::builder::ModuleBuilder;
use plughub_domain::component::{ComponentConfig, StateWriter};
use plughub_domain::error::{ComponentError, TypeError};
use plughub_domain::plugin::{PluginInstance, Usage};
use plughub_domain::types::Type;

const SLOTS: [&str; 4] = ["relay1", "relay2", "relay3", "relay4"];

/// A simulated relay board with `outputs` wired relays.
///
/// Bit `n` of the mask drives relay `n + 1`. Setting a bit beyond the wired
/// outputs fails the whole action and leaves every relay unchanged.
pub struct VirtualRelayBoard {
    outputs: usize,
}

impl PluginInstance for VirtualRelayBoard {}

impl VirtualRelayBoard {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn create(config: &ComponentConfig, _states: &mut StateWriter<'_>) -> Result<Self, ComponentError> {
        // validated as range[1;4]
        let outputs = config.number("outputs").map_or(0, |n| n as usize);
        if outputs == 0 || outputs > SLOTS.len() {
            return Err(ComponentError::driver("relay board needs 1 to 4 outputs"));
        }
        Ok(Self { outputs })
    }

    fn set_mask(&mut self, mask: u8, states: &mut StateWriter<'_>) -> Result<(), ComponentError> {
        if usize::from(mask) >> self.outputs != 0 {
            return Err(ComponentError::driver(format!(
                "mask {mask:#06b} drives unwired outputs (wired: {})",
                self.outputs
            )));
        }
        for (index, slot) in SLOTS.iter().enumerate().take(self.outputs) {
            states.set(slot, mask & (1 << index) != 0)?;
        }
        Ok(())
    }
}

pub(crate) fn declare(module: &mut ModuleBuilder<'_>) -> Result<(), TypeError> {
    let outputs = Type::range(1, 4)?;
    let mut class = module
        .class("relayBoard", VirtualRelayBoard::create)
        .plugin(Usage::Actuator)
        .describe("Simulated four-way relay board")
        .config("outputs", outputs)
        .describe("Number of wired relays");
    for slot in SLOTS {
        class = class.state(slot, Type::Bool);
    }
    class
        .action("setMask", Type::Uint8, VirtualRelayBoard::set_mask)
        .describe("Bit n switches relay n + 1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::tests::registry_with_module;
    use plughub_domain::error::{ComponentError, TypeError};
    use plughub_domain::value::Value;

    #[test]
    fn should_drive_wired_relays_from_mask() {
        let registry = registry_with_module();
        let board = registry
            .create_component("pump", "virtual.relayBoard", &serde_json::json!({ "outputs": 3 }))
            .unwrap();

        board.execute_action("setMask", Value::Number(5.0)).unwrap();

        assert_eq!(board.state("relay1"), Some(Value::Bool(true)));
        assert_eq!(board.state("relay2"), Some(Value::Bool(false)));
        assert_eq!(board.state("relay3"), Some(Value::Bool(true)));
        assert_eq!(board.state("relay4"), Some(Value::Bool(false)));
    }

    #[test]
    fn should_refuse_mask_for_unwired_relay() {
        let registry = registry_with_module();
        let board = registry
            .create_component("pump", "virtual.relayBoard", &serde_json::json!({ "outputs": 2 }))
            .unwrap();

        let result = board.execute_action("setMask", Value::Number(4.0));

        assert!(matches!(result, Err(ComponentError::Driver(_))));
        assert_eq!(board.state("relay3"), Some(Value::Bool(false)));
    }

    #[test]
    fn should_reject_mask_outside_uint8() {
        let registry = registry_with_module();
        let board = registry
            .create_component("pump", "virtual.relayBoard", &serde_json::json!({ "outputs": 4 }))
            .unwrap();

        let err = board
            .execute_action("setMask", Value::Number(256.0))
            .unwrap_err();
        assert_eq!(err.to_string(), "Wrong value '256' for type 'uint8'");
    }

    #[test]
    fn should_reject_board_without_outputs() {
        let registry = registry_with_module();
        assert!(
            registry
                .create_component("pump", "virtual.relayBoard", &serde_json::json!({}))
                .is_err()
        );
    }
}
