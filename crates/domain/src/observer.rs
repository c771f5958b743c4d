//! Typed synchronous observers with RAII subscriptions.
//!
//! One [`Observers`] list exists per event kind. Listeners run synchronously,
//! in subscription order, on the thread that emits. The listener list is
//! snapshotted before dispatch, so a listener may subscribe, unsubscribe or
//! query its emitter without deadlocking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
    next_id: u64,
    entries: Vec<(u64, Listener<E>)>,
}

/// Subscriber list for events of type `E`.
pub struct Observers<E> {
    inner: Arc<Mutex<Listeners<E>>>,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<E: 'static> Observers<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or [`clear`](Self::clear) is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut guard = self.lock();
            let id = guard.next_id;
            guard.next_id += 1;
            guard.entries.push((id, Arc::new(listener)));
            id
        };
        let weak: Weak<Mutex<Listeners<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Deliver `event` to every current listener, in subscription order.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Drop every listener. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Listeners<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a registered listener; unsubscribes when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Build a subscription from its cancellation routine.
    ///
    /// Adapters implementing observer-style ports outside this crate use
    /// this to hand out the same handle type.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(&u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v: &u32| sink.lock().unwrap().push(*v))
    }

    #[test]
    fn should_deliver_events_in_emit_order() {
        let observers = Observers::new();
        let (seen, listener) = recorder();
        let _sub = observers.subscribe(listener);

        observers.emit(&1);
        observers.emit(&2);
        observers.emit(&3);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn should_stop_delivering_after_subscription_dropped() {
        let observers = Observers::new();
        let (seen, listener) = recorder();
        let sub = observers.subscribe(listener);

        observers.emit(&1);
        sub.unsubscribe();
        observers.emit(&2);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert!(observers.is_empty());
    }

    #[test]
    fn should_release_all_listeners_on_clear() {
        let observers = Observers::new();
        let (seen, listener) = recorder();
        let sub = observers.subscribe(listener);

        observers.clear();
        observers.emit(&7);
        drop(sub);

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn should_allow_listener_to_subscribe_during_emit() {
        let observers = Arc::new(Observers::<u32>::new());
        let held = Arc::new(Mutex::new(Vec::new()));

        let inner_observers = Arc::clone(&observers);
        let inner_held = Arc::clone(&held);
        let _sub = observers.subscribe(move |_| {
            let nested = inner_observers.subscribe(|_| {});
            inner_held.lock().unwrap().push(nested);
        });

        observers.emit(&0);
        assert_eq!(observers.len(), 2);
    }
}
