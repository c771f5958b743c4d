//! # plughub-domain
//!
//! Pure domain model for the plughub component bus.
//!
//! ## Responsibilities
//! - **Values** and **Types**: primitive value types with validation, stable
//!   display names and a byte-level codec for the bus
//! - **Plugins**: immutable templates declaring configuration entries and
//!   state/action members
//! - **Components**: live plugin instances whose every state write is checked
//!   against its declared type
//! - **Observers**: typed, synchronous listener lists with RAII subscriptions
//! - The error taxonomy shared by every layer
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and performs no IO.
//! Registry, builder and bus publishing live in `plughub-app`.

pub mod component;
pub mod error;
pub mod observer;
pub mod plugin;
pub mod types;
pub mod value;
