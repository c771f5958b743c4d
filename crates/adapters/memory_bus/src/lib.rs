//! # plughub-adapter-memory-bus
//!
//! In-process bus implementing the [`Transport`](plughub_app::ports::Transport)
//! port without any network.
//!
//! ## Responsibilities
//! - A shared [`MemoryBus`] broker holding retained metadata and component
//!   handles of every connected instance
//! - One [`MemoryTransport`] client per instance, with connectivity that can
//!   be flapped and request failures that can be injected
//! - Remote access for tests and demos: invoke actions, read published states
//! - [`MemoryBus::mirror_into`]: make other instances' plugins and components
//!   appear as remote entries of a registry
//!
//! ## Dependency rule
//! Same as other adapters: depends on `plughub-app` and `plughub-domain`.

mod broker;
pub mod config;
pub mod error;
mod mirror;
mod transport;

pub use broker::{BusEvent, MemoryBus};
pub use config::MemoryBusConfig;
pub use error::MemoryBusError;
pub use transport::MemoryTransport;
