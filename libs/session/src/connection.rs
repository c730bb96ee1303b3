use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use orrery_fabric::transport::lifecycle;
use orrery_fabric::{EventBus, EventTransport, SocketTransport};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::pending::PendingCalls;
use crate::protocol::CONNECTION_ESTABLISHED;

/// Builds the persistent transport a session talks over.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &SessionConfig) -> Result<Arc<dyn EventTransport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&SessionConfig) -> Result<Arc<dyn EventTransport>> + Send + Sync,
{
    fn create(&self, config: &SessionConfig) -> Result<Arc<dyn EventTransport>> {
        self(config)
    }
}

/// Websocket-first socket transport configured from [`SessionConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketFactory;

impl TransportFactory for SocketFactory {
    fn create(&self, config: &SessionConfig) -> Result<Arc<dyn EventTransport>> {
        let transport = SocketTransport::builder()
            .endpoint(&config.endpoint)
            .path(&config.socket_path)
            .connect_timeout(config.connect_timeout())
            .reconnection_attempts(config.reconnection_attempts)
            .reconnection_delay(config.reconnection_delay())
            .build()?;
        Ok(Arc::new(transport))
    }
}

/// State shared with the lifecycle observers.
struct LinkState {
    /// Bumped whenever a transport is built or torn down.
    generation: AtomicU64,
    connecting: AtomicBool,
    connected: watch::Sender<bool>,
}

impl LinkState {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn settle(&self, connected: bool) {
        self.connecting.store(false, Ordering::SeqCst);
        self.connected.send_replace(connected);
    }
}

/// Owns the lazily built transport and its connection state.
pub struct ConnectionManager {
    config: Arc<SessionConfig>,
    factory: Arc<dyn TransportFactory>,
    pending: Arc<PendingCalls>,
    transport: Mutex<Option<Arc<dyn EventTransport>>>,
    state: Arc<LinkState>,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<SessionConfig>,
        factory: Arc<dyn TransportFactory>,
        pending: Arc<PendingCalls>,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            config,
            factory,
            pending,
            transport: Mutex::new(None),
            state: Arc::new(LinkState {
                generation: AtomicU64::new(0),
                connecting: AtomicBool::new(false),
                connected,
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.transport.lock().is_some()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.connected.borrow()
    }

    /// Build the transport and wire its lifecycle observers, once.
    ///
    /// Never connects.
    pub fn ensure_constructed(&self) -> Result<Arc<dyn EventTransport>> {
        let mut slot = self.transport.lock();
        if let Some(transport) = slot.as_ref() {
            return Ok(Arc::clone(transport));
        }

        info!(endpoint = %self.config.endpoint, "initializing socket transport");
        let transport = self.factory.create(&self.config).map_err(|e| {
            error!(error = %e, "failed to build socket transport");
            Error::TransportUnavailable {
                reason: e.to_string(),
            }
        })?;

        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        wire_lifecycle(
            transport.events(),
            generation,
            &self.state,
            Arc::downgrade(&self.pending),
        );
        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }

    /// Make the transport usable, connecting it if needed.
    ///
    /// Waits up to the connect ceiling for the link. If it does not open in
    /// time this still returns the transport; emits are queued or fail on
    /// their own. Concurrent callers share one connect.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn EventTransport>> {
        let transport = self.ensure_constructed()?;
        if self.is_connected() {
            return Ok(transport);
        }

        let mut connected = self.state.connected.subscribe();
        if !self.state.connecting.swap(true, Ordering::SeqCst) {
            info!(endpoint = %self.config.endpoint, "connecting socket");
            transport.connect();
        }

        let ceiling = self.config.timeouts.connect_ceiling();
        let opened = tokio::time::timeout(ceiling, connected.wait_for(|up| *up))
            .await
            .map(|waited| waited.is_ok())
            .unwrap_or(false);
        if !opened {
            warn!(?ceiling, "socket connection timeout, proceeding anyway");
        }
        Ok(transport)
    }

    /// Reject every pending call, disconnect and forget the transport.
    ///
    /// The next event-based operation builds a fresh one.
    pub fn teardown(&self) {
        let Some(transport) = self.transport.lock().take() else {
            debug!("teardown with no transport");
            return;
        };
        // Events still in flight from the old transport are ignored from here.
        self.state.generation.fetch_add(1, Ordering::SeqCst);

        let rejected = self.pending.fail_all(|| Error::SessionClosed);
        transport.disconnect();
        self.state.settle(false);
        info!(rejected, "socket transport torn down");
    }
}

fn wire_lifecycle(
    bus: &EventBus,
    generation: u64,
    state: &Arc<LinkState>,
    pending: Weak<PendingCalls>,
) {
    let link = Arc::clone(state);
    bus.on(lifecycle::CONNECT, move |_| {
        if link.is_current(generation) {
            link.settle(true);
            info!(generation, "socket connected");
        }
    });

    let link = Arc::clone(state);
    bus.on(lifecycle::CONNECT_ERROR, move |payload| {
        if !link.is_current(generation) {
            return;
        }
        link.settle(false);
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        error!(generation, error = message, "socket connection error");
    });

    let link = Arc::clone(state);
    bus.on(lifecycle::DISCONNECT, move |payload| {
        if !link.is_current(generation) {
            return;
        }
        link.settle(false);
        let reason = payload.as_str().unwrap_or("unknown").to_string();
        info!(generation, %reason, "socket disconnected");

        if let Some(pending) = pending.upgrade() {
            let failed = pending.fail_all(|| Error::ConnectionLost {
                reason: reason.clone(),
            });
            if failed > 0 {
                warn!(failed, %reason, "failed calls in flight");
            }
        }
    });

    bus.on(CONNECTION_ESTABLISHED, |payload| {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!(greeting = message, "connection established");
    });
}
