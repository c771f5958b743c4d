//! Memory bus configuration.

use serde::Deserialize;

/// Configuration for the in-process bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryBusConfig {
    /// Whether new clients start connected.
    pub start_online: bool,
    /// Toggle connectivity every N seconds to exercise republishing; 0 disables.
    pub flap_interval_secs: u64,
}

impl Default for MemoryBusConfig {
    fn default() -> Self {
        Self {
            start_online: true,
            flap_interval_secs: 0,
        }
    }
}
