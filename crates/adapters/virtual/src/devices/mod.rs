//! Virtual device plugins: light, temperature sensor, relay board.
//!
//! Each device file declares one class of the `virtual` module and holds its
//! instance type. State lives in the component host; instances only keep
//! what the handlers need between calls.

mod light;
mod relay_board;
mod sensor;

pub use light::VirtualLight;
pub use relay_board::VirtualRelayBoard;
pub use sensor::{VirtualSensor, record_temperature};

use plughub_app::builder::ModuleBuilder;
use plughub_domain::error::TypeError;

/// Declare every virtual device class on `module`.
///
/// # Errors
///
/// Returns the first [`TypeError`] met while constructing a member type.
pub(crate) fn declare_all(module: &mut ModuleBuilder<'_>) -> Result<(), TypeError> {
    light::declare(module)?;
    sensor::declare(module)?;
    relay_board::declare(module)
}
