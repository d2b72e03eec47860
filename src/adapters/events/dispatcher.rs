//! In-process event dispatcher keyed by event name.
//!
//! Delivery is synchronous and deterministic: `emit` runs every listener
//! registered for the name, in registration order, on the caller's thread.
//!
//! # Isolation
//!
//! A listener returning `Err` is logged at `warn` and a panicking listener
//! is caught and logged at `error`. Neither stops delivery to the rest.
//!
//! # Snapshot delivery
//!
//! `emit` copies the listener list before the first callback runs, so a
//! listener may register or remove listeners (including itself) without
//! affecting the emission in flight.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};

use crate::domain::foundation::{DomainError, ListenerId};

/// Callback signature for listeners.
pub type ListenerFn<T> = dyn Fn(&T) -> Result<(), DomainError> + Send + Sync;

/// A registered listener.
pub struct Listener<T> {
    id: ListenerId,
    event_name: String,
    callback: Arc<ListenerFn<T>>,
}

impl<T> Listener<T> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            event_name: self.event_name.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("event_name", &self.event_name)
            .finish_non_exhaustive()
    }
}

/// Removal hook held weakly by `Subscription`.
trait ListenerRegistry: Send + Sync {
    fn remove(&self, id: ListenerId) -> bool;
}

struct Registry<T> {
    listeners: RwLock<HashMap<String, Vec<Listener<T>>>>,
}

impl<T> Registry<T> {
    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|l| l.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }
}

impl<T: Send + Sync> ListenerRegistry for Registry<T> {
    fn remove(&self, id: ListenerId) -> bool {
        self.remove_listener(id)
    }
}

/// Name-keyed listener registry with isolated synchronous delivery.
///
/// Cloning is cheap and yields a handle to the same registry.
///
/// # Example
///
/// ```ignore
/// let dispatcher = EventDispatcher::<InboundEvent>::new();
/// let sub = dispatcher.on("notification", |event| {
///     println!("{:?}", event);
///     Ok(())
/// });
/// dispatcher.emit("notification", &event);
/// drop(sub); // listener removed
/// ```
pub struct EventDispatcher<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for EventDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Send + Sync + 'static> EventDispatcher<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register `callback` for `event_name`.
    ///
    /// The listener stays registered until the returned `Subscription` is
    /// dropped or unsubscribed, or `off` is called with its id.
    pub fn on<F>(&self, event_name: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        let listener = Listener {
            id: ListenerId::next(),
            event_name: event_name.into(),
            callback: Arc::new(callback),
        };
        let id = listener.id;

        tracing::trace!(listener_id = %id, event = %listener.event_name, "Listener registered");

        self.registry
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(listener.event_name.clone())
            .or_default()
            .push(listener);

        let registry: Arc<dyn ListenerRegistry> = self.registry.clone();
        Subscription {
            id,
            registry: Some(Arc::downgrade(&registry)),
        }
    }

    /// Remove a listener by id. Unknown ids are ignored.
    pub fn off(&self, id: ListenerId) -> bool {
        self.registry.remove_listener(id)
    }

    /// Deliver `payload` to every listener registered for `event_name`.
    ///
    /// Returns the number of listeners that completed without error.
    pub fn emit(&self, event_name: &str, payload: &T) -> usize {
        let snapshot: Vec<Listener<T>> = {
            let listeners = self.registry.listeners.read().unwrap_or_else(|e| e.into_inner());
            match listeners.get(event_name) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for listener in &snapshot {
            let callback = Arc::clone(&listener.callback);
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    tracing::warn!(
                        listener_id = %listener.id,
                        event = %event_name,
                        error = %err,
                        "Listener returned an error"
                    );
                }
                Err(cause) => {
                    let err = DomainError::listener(panic_message(cause.as_ref()));
                    tracing::error!(
                        listener_id = %listener.id,
                        event = %event_name,
                        error = %err,
                        "Listener panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.registry
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_name)
            .map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listener_count(event_name) > 0
    }

    /// Total listeners across all event names.
    pub fn total_listeners(&self) -> usize {
        self.registry
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl<T: Send + Sync + 'static> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.registry.listeners.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("EventDispatcher")
            .field("events", &listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle removes the listener. `unsubscribe` does the same
/// explicitly and may be called any number of times.
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    id: ListenerId,
    registry: Option<Weak<dyn ListenerRegistry>>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether this handle still owns its listener.
    pub fn is_active(&self) -> bool {
        self.registry
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Remove the listener. Returns `true` only for the call that removed it.
    pub fn unsubscribe(&mut self) -> bool {
        match self.registry.take().and_then(|weak| weak.upgrade()) {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }

    /// Keep the listener registered for the dispatcher's lifetime.
    pub fn forget(mut self) -> ListenerId {
        self.registry = None;
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
