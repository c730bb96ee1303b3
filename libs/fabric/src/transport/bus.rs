//! Named-event observer registry owned by each event transport.
//!
//! Observers are invoked in registration order. One-shot observers are
//! removed from the registry before they run, so a second dispatch of the
//! same event can never reach them. Callbacks run outside the registry lock
//! and may freely register or remove observers; filters run under it and
//! must not touch the bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Handle to a registered observer, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Persistent = Arc<dyn Fn(&Value) + Send + Sync>;
type OneShot = Box<dyn FnOnce(&Value) + Send>;
type Filter = Box<dyn Fn(&Value) -> bool + Send + Sync>;

enum Callback {
    Persistent(Persistent),
    Once(OneShot),
}

impl Callback {
    fn invoke(self, payload: &Value) {
        match self {
            Callback::Persistent(handler) => handler(payload),
            Callback::Once(handler) => handler(payload),
        }
    }
}

struct Listener {
    id: ListenerId,
    event: String,
    filter: Option<Filter>,
    callback: Callback,
}

impl Listener {
    fn matches(&self, event: &str, payload: &Value) -> bool {
        self.event == event && self.filter.as_ref().map_or(true, |accept| accept(payload))
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent observer for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event, None, Callback::Persistent(Arc::new(handler)))
    }

    /// Register an observer that runs for the next `event` only.
    pub fn once<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: FnOnce(&Value) + Send + 'static,
    {
        self.register(event, None, Callback::Once(Box::new(handler)))
    }

    /// Register a one-shot observer that is only consumed by a payload
    /// accepted by `filter`. Rejected payloads leave it in place.
    pub fn once_where<P, F>(&self, event: &str, filter: P, handler: F) -> ListenerId
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        F: FnOnce(&Value) + Send + 'static,
    {
        self.register(
            event,
            Some(Box::new(filter)),
            Callback::Once(Box::new(handler)),
        )
    }

    /// Remove an observer. Returns `false` if it already fired or was removed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|listener| listener.id == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of observers currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|listener| listener.event == event)
            .count()
    }

    /// Remove every observer.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Deliver `payload` to every observer of `event`.
    ///
    /// Returns how many observers ran.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let callbacks = {
            let mut listeners = self.listeners.lock();
            let mut callbacks = Vec::new();
            let mut index = 0;
            while index < listeners.len() {
                if !listeners[index].matches(event, payload) {
                    index += 1;
                    continue;
                }
                match &listeners[index].callback {
                    Callback::Persistent(handler) => {
                        callbacks.push(Callback::Persistent(Arc::clone(handler)));
                        index += 1;
                    }
                    Callback::Once(_) => callbacks.push(listeners.remove(index).callback),
                }
            }
            callbacks
        };

        let count = callbacks.len();
        for callback in callbacks {
            callback.invoke(payload);
        }
        count
    }

    fn register(&self, event: &str, filter: Option<Filter>, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener {
            id,
            event: event.to_string(),
            filter,
            callback,
        });
        id
    }
}
