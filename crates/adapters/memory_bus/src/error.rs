//! Memory bus error types.

use plughub_app::ports::TransportError;

/// Errors specific to the in-process bus.
#[derive(Debug, thiserror::Error)]
pub enum MemoryBusError {
    /// A failure scheduled with [`MemoryTransport::fail_next`](crate::MemoryTransport::fail_next).
    #[error("injected failure")]
    Injected,

    /// No handle is registered for the component.
    #[error("component '{component}' of instance '{instance}' is not on the bus")]
    UnknownComponent { instance: String, component: String },

    /// The component handle has no callback for the action.
    #[error("action '{action}' is not registered on component '{component}'")]
    UnknownAction { component: String, action: String },

    /// The handle was replaced by a later `add_local_component`.
    #[error("handle of component '{0}' was superseded")]
    StaleHandle(String),
}

impl MemoryBusError {
    /// Wrap as a [`TransportError`] for the request on `path`.
    pub fn into_transport(self, path: impl Into<String>) -> TransportError {
        TransportError::request(path, self)
    }
}
