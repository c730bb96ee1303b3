use std::sync::{Arc, Weak};
use std::time::Duration;

use orrery_fabric::EventTransport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pending::{CorrelationId, PendingCalls, PendingGuard};
use crate::protocol::{Operation, CORRELATION_KEY};

/// Turns a fire-and-forget emission plus a later response event into one
/// awaitable call.
pub struct CallCorrelator {
    pending: Arc<PendingCalls>,
}

impl CallCorrelator {
    pub fn new(pending: Arc<PendingCalls>) -> Self {
        Self { pending }
    }

    pub fn pending(&self) -> &Arc<PendingCalls> {
        &self.pending
    }

    /// Emit `operation.request` and wait for its response or error event.
    ///
    /// Settles exactly once: with the first matching response, the first
    /// matching error, or a timeout `timeout` after the call starts. Time
    /// spent handing the request to the transport counts against it. The
    /// observers are
    /// registered before the request leaves so an immediate answer is
    /// not missed.
    pub async fn call<Req, Res>(
        &self,
        transport: &dyn EventTransport,
        operation: &Operation,
        payload: &Req,
        timeout: Duration,
    ) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let id = CorrelationId::new();
        let request = tag_request(operation, payload, &id)?;

        let mut receiver = self.pending.register(id.clone(), operation.name);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        let name = operation.name;
        let bus = Arc::clone(transport.events());
        let observers = vec![
            bus.once_where(
                operation.response,
                matches_call(&id),
                settle_with(&self.pending, &id, |payload| Ok(payload)),
            ),
            bus.once_where(
                operation.error,
                matches_call(&id),
                settle_with(&self.pending, &id, move |payload| Err(Error::server(name, payload))),
            ),
        ];
        self.pending.attach(&id, bus, observers);

        // One deadline covers the emit and the reply.
        let deadline = Instant::now() + timeout;
        let expire = || {
            let expired = Error::Timeout {
                operation: operation.name,
                after: timeout,
            };
            if self.pending.settle(&id, Err(expired)) {
                warn!(operation = operation.name, %id, ?timeout, "request timed out");
            }
        };

        debug!(operation = operation.name, event = operation.request, %id, "emitting request");
        match tokio::time::timeout_at(deadline, transport.emit(operation.request, request)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(operation = operation.name, %id, error = %err, "emit failed");
                self.pending.settle(&id, Err(Error::emit(err)));
            }
            Err(_) => expire(),
        }

        let outcome = match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(outcome) => outcome,
            Err(_) => {
                expire();
                receiver.await
            }
        };

        // A dropped sender means the store went away with the session.
        let value = outcome.unwrap_or(Err(Error::SessionClosed))?;
        serde_json::from_value(value).map_err(|e| Error::Decode {
            operation: operation.name,
            message: e.to_string(),
        })
    }
}

/// Serialize the request and stamp it with its correlation id.
fn tag_request<Req: Serialize + ?Sized>(
    operation: &Operation,
    payload: &Req,
    id: &CorrelationId,
) -> Result<Value> {
    let invalid = || Error::InvalidPayload {
        operation: operation.name,
    };
    let mut request = serde_json::to_value(payload).map_err(|_| invalid())?;
    let Value::Object(fields) = &mut request else {
        return Err(invalid());
    };
    fields.insert(CORRELATION_KEY.to_string(), Value::String(id.to_string()));
    Ok(request)
}

/// Accepts payloads echoing `id`, or carrying no correlation id at all.
fn matches_call(id: &CorrelationId) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
    let id = id.clone();
    move |payload| match payload.get(CORRELATION_KEY) {
        None => true,
        Some(Value::String(theirs)) => theirs == id.as_str(),
        Some(_) => false,
    }
}

fn settle_with(
    pending: &Arc<PendingCalls>,
    id: &CorrelationId,
    outcome: impl FnOnce(Value) -> Result<Value> + Send + 'static,
) -> impl FnOnce(&Value) + Send + 'static {
    let pending: Weak<PendingCalls> = Arc::downgrade(pending);
    let id = id.clone();
    move |payload| {
        if let Some(pending) = pending.upgrade() {
            pending.settle(&id, outcome(strip_correlation(payload)));
        }
    }
}

fn strip_correlation(payload: &Value) -> Value {
    let mut payload = payload.clone();
    if let Value::Object(fields) = &mut payload {
        fields.remove(CORRELATION_KEY);
    }
    payload
}
