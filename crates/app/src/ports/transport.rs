//! Transport port: the pub/sub bus connection a publisher drives.
//!
//! Every operation is **issued when the method is called**: implementations
//! must record or send the request synchronously and return a future that
//! only reports its completion. Callers rely on this to keep bus-side
//! ordering identical to call order without awaiting each request.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use plughub_domain::observer::Subscription;

/// Completion of a bus request.
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// Receives the raw payload of an action invoked from the bus.
pub type ActionCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Notified with the new online flag on every connectivity change.
pub type OnlineListener = Box<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bus is offline")]
    Offline,

    #[error("bus request on '{path}' failed")]
    Request {
        path: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl TransportError {
    pub fn request(
        path: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Request {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Connection of one instance to the bus.
pub trait Transport: Send + Sync {
    fn is_online(&self) -> bool;

    /// Observe connectivity changes. Listeners are called synchronously and
    /// never while the transport holds an internal lock.
    fn subscribe_online(&self, listener: OnlineListener) -> Subscription;

    /// Publish a retained metadata document under `path` for this instance.
    fn set_metadata(&self, path: &str, value: serde_json::Value) -> TransportFuture;

    /// Remove the metadata document under `path` for this instance.
    fn clear_metadata(&self, path: &str) -> TransportFuture;

    /// Expose local component `id` on the bus. Calling it again for the same
    /// id returns a fresh handle that replaces the previous one.
    fn add_local_component(&self, id: &str) -> Arc<dyn ComponentHandle>;

    /// Withdraw local component `id` from the bus.
    fn remove_local_component(&self, id: &str) -> TransportFuture;
}

/// Bus-side presence of one local component.
pub trait ComponentHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Route bus invocations of action `name` to `callback`, replacing any
    /// earlier registration under the same name.
    fn register_action(&self, name: &str, callback: ActionCallback);

    /// Publish the encoded value of state `name`.
    fn set_state(&self, name: &str, value: Vec<u8>) -> TransportFuture;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }

    fn subscribe_online(&self, listener: OnlineListener) -> Subscription {
        (**self).subscribe_online(listener)
    }

    fn set_metadata(&self, path: &str, value: serde_json::Value) -> TransportFuture {
        (**self).set_metadata(path, value)
    }

    fn clear_metadata(&self, path: &str) -> TransportFuture {
        (**self).clear_metadata(path)
    }

    fn add_local_component(&self, id: &str) -> Arc<dyn ComponentHandle> {
        (**self).add_local_component(id)
    }

    fn remove_local_component(&self, id: &str) -> TransportFuture {
        (**self).remove_local_component(id)
    }
}
