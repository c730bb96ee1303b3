//! Store of calls awaiting a response event.
//!
//! Each entry owns the sender half of a oneshot and the ids of the two
//! observers waiting on its behalf. Every settlement path (response, error,
//! timeout, teardown, disconnect) goes through [`PendingCalls::settle`] or
//! [`PendingCalls::fail_all`], both of which remove the entry under the lock
//! first. Whoever removes it delivers the outcome; later paths find nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use orrery_fabric::{EventBus, ListenerId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier echoed by the server to route a response to its call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) type Outcome = Result<Value>;

struct Observers {
    bus: Arc<EventBus>,
    ids: Vec<ListenerId>,
}

impl Observers {
    fn deactivate(self) {
        for id in self.ids {
            self.bus.off(id);
        }
    }
}

struct PendingCall {
    operation: &'static str,
    settle: oneshot::Sender<Outcome>,
    observers: Option<Observers>,
}

#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<CorrelationId, PendingCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &self,
        id: CorrelationId,
        operation: &'static str,
    ) -> oneshot::Receiver<Outcome> {
        let (settle, receiver) = oneshot::channel();
        self.calls.lock().insert(
            id,
            PendingCall {
                operation,
                settle,
                observers: None,
            },
        );
        receiver
    }

    /// Record the observers of a registered call. If the call already
    /// settled they are deactivated straight away.
    pub(crate) fn attach(&self, id: &CorrelationId, bus: Arc<EventBus>, ids: Vec<ListenerId>) {
        let observers = Observers { bus, ids };
        let orphaned = {
            let mut calls = self.calls.lock();
            match calls.get_mut(id) {
                Some(call) => {
                    call.observers = Some(observers);
                    None
                }
                None => Some(observers),
            }
        };
        if let Some(observers) = orphaned {
            observers.deactivate();
        }
    }

    /// Deliver `outcome` if the call is still pending.
    ///
    /// Returns `false` when another path settled it first.
    pub(crate) fn settle(&self, id: &CorrelationId, outcome: Outcome) -> bool {
        let Some(call) = self.calls.lock().remove(id) else {
            return false;
        };
        debug!(
            operation = call.operation,
            %id,
            ok = outcome.is_ok(),
            "settled pending call"
        );
        if let Some(observers) = call.observers {
            observers.deactivate();
        }
        let _ = call.settle.send(outcome);
        true
    }

    /// Drop a call without delivering anything.
    pub(crate) fn cancel(&self, id: &CorrelationId) {
        let Some(call) = self.calls.lock().remove(id) else {
            return;
        };
        debug!(operation = call.operation, %id, "abandoned pending call");
        if let Some(observers) = call.observers {
            observers.deactivate();
        }
    }

    /// Reject every outstanding call with an error built by `reason`.
    pub fn fail_all(&self, reason: impl Fn() -> Error) -> usize {
        let drained: Vec<_> = self.calls.lock().drain().collect();
        let count = drained.len();
        for (_, call) in drained {
            if let Some(observers) = call.observers {
                observers.deactivate();
            }
            let _ = call.settle.send(Err(reason()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// Cancels its call on drop unless it was already settled.
pub(crate) struct PendingGuard<'a> {
    pub(crate) pending: &'a PendingCalls,
    pub(crate) id: &'a CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(self.id);
    }
}
