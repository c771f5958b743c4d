//! State feed: every local component's state changes on a tokio broadcast channel.
//!
//! Component observers are synchronous; the feed lets async consumers (the
//! daemon's logger, tests) follow all local components without registering
//! a listener on each one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use plughub_domain::component::{ComponentHost, StateChange};
use plughub_domain::observer::Subscription;

use crate::registry::{ComponentEntry, ComponentEvent, Registry};

type Watches = Arc<Mutex<HashMap<String, Subscription>>>;

/// Broadcasts [`StateChange`]s of every local component of a registry.
///
/// Sending succeeds even when there are no receivers (the change is dropped).
pub struct StateFeed {
    sender: broadcast::Sender<StateChange>,
    _watches: Watches,
    _registry: Subscription,
}

impl StateFeed {
    /// Follow the current and future local components of `registry`.
    #[must_use]
    pub fn attach(registry: &Registry, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let watches: Watches = Arc::default();

        for entry in registry.get_components(None) {
            if let ComponentEntry::Local(host) = entry {
                watch(&watches, &sender, &host);
            }
        }

        let registry_sub = {
            let watches = Arc::clone(&watches);
            let sender = sender.clone();
            registry.subscribe_components(move |event| match event {
                ComponentEvent::Added {
                    instance: None,
                    component: ComponentEntry::Local(host),
                } => watch(&watches, &sender, host),
                ComponentEvent::Removed {
                    instance: None,
                    component,
                } => {
                    watches
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(component.id());
                }
                _ => {}
            })
        };

        Self {
            sender,
            _watches: watches,
            _registry: registry_sub,
        }
    }

    /// Receive every change committed *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }
}

fn watch(watches: &Watches, sender: &broadcast::Sender<StateChange>, host: &Arc<ComponentHost>) {
    let sender = sender.clone();
    let subscription = host.subscribe_states(move |change| {
        // fails only without receivers
        let _ = sender.send(change.clone());
    });
    watches
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(host.id().to_string(), subscription);
}
