//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `plughub.toml` in the working directory (or the file named by
//! `PLUGHUB_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashSet;

use plughub_adapter_memory_bus::MemoryBusConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of this process on the bus.
    pub instance: InstanceConfig,
    /// In-process bus settings.
    pub bus: MemoryBusConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Driver module toggles.
    pub modules: ModulesConfig,
    /// Simulated sensor readings.
    pub simulation: SimulationConfig,
    /// Components created at start-up.
    pub components: Vec<ComponentSpec>,
}

/// Instance identity.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Name under which metadata and handles are published.
    pub name: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Per-module toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Build the `virtual` driver module.
    pub virtual_enabled: bool,
}

/// Periodic readings pushed to virtual temperature sensors.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds between readings; 0 disables the simulation.
    pub sensor_interval_secs: u64,
    /// Baseline temperature in degrees Celsius.
    pub base_celsius: f64,
}

/// One `[[components]]` entry.
#[derive(Debug, Deserialize)]
pub struct ComponentSpec {
    /// Component id, unique within the instance.
    pub id: String,
    /// Plugin id (`<module>.<name>`).
    pub plugin: String,
    /// Raw configuration, validated by the plugin's schema.
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Config {
    /// Load configuration from `plughub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PLUGHUB_CONFIG").unwrap_or_else(|_| "plughub.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PLUGHUB_INSTANCE") {
            self.instance.name = val;
        }
        if let Ok(val) = std::env::var("PLUGHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.instance.name.is_empty() || self.instance.name.contains('/') {
            return Err(ConfigError::Validation(
                "instance name must be non-empty and contain no '/'".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for component in &self.components {
            if component.id.is_empty() || component.id.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "invalid component id '{}'",
                    component.id
                )));
            }
            if !seen.insert(component.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate component id '{}'",
                    component.id
                )));
            }
            if !component.config.is_object() {
                return Err(ConfigError::Validation(format!(
                    "config of component '{}' must be a table",
                    component.id
                )));
            }
        }
        Ok(())
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            name: format!("plughub-{}", &id[..8]),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "plughubd=info,plughub=info".to_string(),
        }
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sensor_interval_secs: 10,
            base_celsius: 21.0,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
