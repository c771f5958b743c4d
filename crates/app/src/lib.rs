//! # plughub-app
//!
//! Application layer: registry, plugin building, bus publishing and the
//! **port definitions** (traits) bus adapters implement.
//!
//! ## Responsibilities
//! - [`registry::Registry`]: catalog of local and remote plugins/components
//!   with typed add/remove notifications
//! - [`builder::ModuleBuilder`]: turn a driver module's typed class
//!   declarations into registered plugins
//! - [`publisher::BusPublisher`]: keep the bus view of local entries
//!   consistent across connectivity changes
//! - [`state_feed::StateFeed`]: async broadcast of local state changes
//! - Define the **driven port** [`ports::Transport`] that bus adapters implement
//!
//! ## Dependency rule
//! Depends on `plughub-domain` only (plus `tokio` for spawning and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod builder;
pub mod detached;
pub mod ports;
pub mod publisher;
pub mod registry;
pub mod state_feed;
