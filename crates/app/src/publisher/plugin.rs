//! Bus-side presence of one local plugin.

use std::sync::Arc;

use plughub_domain::plugin::Plugin;

use super::Bus;

pub(super) struct BusPlugin {
    plugin: Arc<Plugin>,
    path: String,
}

impl BusPlugin {
    pub(super) fn new(plugin: Arc<Plugin>) -> Self {
        let path = format!("plugins/{}", plugin.id);
        Self { plugin, path }
    }

    /// Publish the descriptor. Only called while the bus is online.
    pub(super) fn online(&self, bus: &Bus) {
        match serde_json::to_value(self.plugin.descriptor()) {
            Ok(descriptor) => bus.set_metadata(&self.path, descriptor),
            Err(err) => {
                tracing::error!(plugin = %self.plugin.id, error = %err, "cannot serialize plugin descriptor");
            }
        }
    }

    /// Clear the descriptor, whether the bus is online or not.
    pub(super) fn close(&self, bus: &Bus) {
        bus.clear_metadata(&self.path);
    }
}
