//! Bus-side presence of one local component.

use std::sync::Arc;

use plughub_domain::component::{ComponentHost, StateChange};
use plughub_domain::observer::Subscription;
use plughub_domain::plugin::{ComponentDescriptor, Plugin};
use plughub_domain::value::Value;

use super::Bus;
use crate::ports::ComponentHandle;

struct Link {
    handle: Arc<dyn ComponentHandle>,
    _states: Subscription,
}

pub(super) struct BusComponent {
    host: Arc<ComponentHost>,
    link: Option<Link>,
}

impl BusComponent {
    pub(super) fn new(host: Arc<ComponentHost>) -> Self {
        Self { host, link: None }
    }

    /// Expose the component: handle, action callbacks, every state, then the
    /// descriptor. Calling it again replaces the previous handle.
    pub(super) fn online(&mut self, bus: &Bus) {
        self.link = None;
        let id = self.host.id().to_string();
        let plugin = Arc::clone(self.host.plugin());
        let handle = bus.transport().add_local_component(&id);

        for action in plugin.actions() {
            let host = Arc::downgrade(&self.host);
            let name = action.name.clone();
            let value_type = action.value_type.clone();
            handle.register_action(
                &action.name,
                Arc::new(move |payload: &[u8]| {
                    let Some(host) = host.upgrade() else {
                        return;
                    };
                    match value_type.decode(payload) {
                        Ok(value) => {
                            if let Err(err) = host.execute_action(&name, value) {
                                tracing::warn!(component = %host.id(), action = %name, error = %err, "bus action failed");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(component = %host.id(), action = %name, error = %err, "bus action payload rejected");
                        }
                    }
                }),
            );
        }

        let forward = {
            let bus = bus.clone();
            let handle = Arc::clone(&handle);
            let plugin = Arc::clone(&plugin);
            move |change: &StateChange| {
                send_state(&bus, handle.as_ref(), &plugin, &change.member, &change.value);
            }
        };
        let states = self.host.subscribe_states(forward);

        for (name, value) in self.host.get_states() {
            send_state(bus, handle.as_ref(), &plugin, &name, &value);
        }

        let descriptor = ComponentDescriptor {
            id: id.clone(),
            plugin: plugin.id.clone(),
        };
        match serde_json::to_value(descriptor) {
            Ok(descriptor) => bus.set_metadata(&format!("components/{id}"), descriptor),
            Err(err) => {
                tracing::error!(component = %id, error = %err, "cannot serialize component descriptor");
            }
        }

        self.link = Some(Link {
            handle,
            _states: states,
        });
        tracing::debug!(component = %id, "component online");
    }

    /// Withdraw the handle. The `components/<id>` metadata stays in place.
    pub(super) fn offline(&mut self, bus: &Bus) {
        if let Some(link) = self.link.take() {
            drop(link);
            bus.remove_local_component(self.host.id());
            tracing::debug!(component = %self.host.id(), "component offline");
        }
    }

    pub(super) fn close(&mut self, bus: &Bus) {
        self.offline(bus);
    }
}

fn send_state(bus: &Bus, handle: &dyn ComponentHandle, plugin: &Plugin, name: &str, value: &Value) {
    let Some(member) = plugin.member(name) else {
        return;
    };
    match member.value_type.encode(value) {
        Ok(bytes) => bus.set_state(handle, name, bytes),
        Err(err) => {
            tracing::error!(component = %handle.id(), state = %name, error = %err, "cannot encode state");
        }
    }
}
