//! Client side of the memory bus: one [`MemoryTransport`] per instance.

use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use plughub_app::ports::{
    ActionCallback, ComponentHandle, OnlineListener, Transport, TransportError, TransportFuture,
};
use plughub_domain::observer::{Observers, Subscription};

use crate::broker::MemoryBus;
use crate::error::MemoryBusError;

struct Client {
    instance: String,
    online: AtomicBool,
    failures: AtomicUsize,
    listeners: Observers<bool>,
}

impl Client {
    /// Admit a request on `path`: refused while offline, or when a failure
    /// was scheduled.
    fn admit(&self, path: &str) -> Result<(), TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            tracing::debug!(instance = %self.instance, path, "bus request ignored while offline");
            return Err(TransportError::Offline);
        }
        let scheduled = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled {
            return Err(MemoryBusError::Injected.into_transport(path));
        }
        Ok(())
    }
}

fn completed(result: Result<(), TransportError>) -> TransportFuture {
    Box::pin(future::ready(result))
}

/// Connection of one instance to a [`MemoryBus`].
pub struct MemoryTransport {
    bus: MemoryBus,
    client: Arc<Client>,
}

impl MemoryTransport {
    pub(crate) fn new(bus: MemoryBus, instance: String, online: bool) -> Self {
        Self {
            bus,
            client: Arc::new(Client {
                instance,
                online: AtomicBool::new(online),
                failures: AtomicUsize::new(0),
                listeners: Observers::new(),
            }),
        }
    }

    #[must_use]
    pub fn instance(&self) -> &str {
        &self.client.instance
    }

    #[must_use]
    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    /// Change connectivity and notify listeners. Going offline drops every
    /// component handle of this instance; retained metadata stays.
    pub fn set_online(&self, online: bool) {
        if self.client.online.swap(online, Ordering::SeqCst) == online {
            return;
        }
        if !online {
            self.bus.remove_instance_components(&self.client.instance);
        }
        tracing::info!(instance = %self.client.instance, online, "bus connectivity changed");
        self.client.listeners.emit(&online);
    }

    /// Make the next `count` requests of this instance fail.
    pub fn fail_next(&self, count: usize) {
        self.client.failures.store(count, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    fn is_online(&self) -> bool {
        self.client.online.load(Ordering::SeqCst)
    }

    fn subscribe_online(&self, listener: OnlineListener) -> Subscription {
        self.client
            .listeners
            .subscribe(move |online: &bool| listener(*online))
    }

    fn set_metadata(&self, path: &str, value: serde_json::Value) -> TransportFuture {
        let result = self.client.admit(path);
        if result.is_ok() {
            self.bus.set_metadata(&self.client.instance, path, value);
        }
        completed(result)
    }

    fn clear_metadata(&self, path: &str) -> TransportFuture {
        let result = self.client.admit(path);
        if result.is_ok() {
            self.bus.clear_metadata(&self.client.instance, path);
        }
        completed(result)
    }

    fn add_local_component(&self, id: &str) -> Arc<dyn ComponentHandle> {
        let generation = self.bus.add_component(&self.client.instance, id);
        Arc::new(MemoryHandle {
            bus: self.bus.clone(),
            client: Arc::clone(&self.client),
            id: id.to_string(),
            generation,
        })
    }

    fn remove_local_component(&self, id: &str) -> TransportFuture {
        self.bus.remove_component(&self.client.instance, id);
        completed(Ok(()))
    }
}

/// Bus-side handle of one local component.
struct MemoryHandle {
    bus: MemoryBus,
    client: Arc<Client>,
    id: String,
    generation: u64,
}

impl ComponentHandle for MemoryHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn register_action(&self, name: &str, callback: ActionCallback) {
        if let Err(err) = self.bus.register_action(
            &self.client.instance,
            &self.id,
            self.generation,
            name,
            callback,
        ) {
            tracing::warn!(component = %self.id, action = name, error = %err, "action not registered");
        }
    }

    fn set_state(&self, name: &str, value: Vec<u8>) -> TransportFuture {
        let path = format!("{}/{name}", self.id);
        if let Err(err) = self.client.admit(&path) {
            return completed(Err(err));
        }
        let result = self
            .bus
            .set_state(
                &self.client.instance,
                &self.id,
                self.generation,
                name,
                value,
            )
            .map_err(|err| err.into_transport(path));
        completed(result)
    }
}
