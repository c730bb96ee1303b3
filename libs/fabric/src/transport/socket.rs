use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bus::EventBus;
use super::lifecycle::{
    CLIENT_DISCONNECT, CONNECT, CONNECT_ERROR, DISCONNECT, TRANSPORT_CLOSE, TRANSPORT_ERROR,
};
use super::link::Link;
use super::EventTransport;
use crate::codec::Frame;
use crate::error::{Error, Result};

pub const DEFAULT_PATH: &str = "/socket.io/";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;
/// A link open at least this long refills the reconnection budget.
const STABLE_LINK: Duration = Duration::from_secs(30);

/// Wire protocol used by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Full-duplex websocket, one JSON frame per text message
    WebSocket,
    /// HTTP long-polling, JSON arrays of frames
    Polling,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::WebSocket => "websocket",
            Protocol::Polling => "polling",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved settings of a [`SocketTransport`]
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub endpoint: Url,
    pub path: String,
    /// Negotiation order
    pub protocols: Vec<Protocol>,
    /// Bound on each protocol's open attempt
    pub connect_timeout: Duration,
    /// Retries after a failed open before giving up
    pub reconnection_attempts: u32,
    pub reconnection_delay: Duration,
    pub outbound_capacity: usize,
}

impl SocketOptions {
    /// URL of a link for `protocol`, with the polling session id when known.
    pub fn link_url(&self, protocol: Protocol, sid: Option<&str>) -> Result<Url> {
        let mut url = self
            .endpoint
            .join(&self.path)
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let scheme = match (url.scheme(), protocol) {
            ("http" | "ws", Protocol::WebSocket) => "ws",
            ("https" | "wss", Protocol::WebSocket) => "wss",
            ("http" | "ws", Protocol::Polling) => "http",
            ("https" | "wss", Protocol::Polling) => "https",
            (other, _) => {
                return Err(Error::InvalidUrl(format!("unsupported scheme `{other}`")));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::InvalidUrl(format!("cannot switch endpoint to `{scheme}`")))?;

        url.query_pairs_mut()
            .append_pair("transport", protocol.as_str());
        if let Some(sid) = sid {
            url.query_pairs_mut().append_pair("sid", sid);
        }
        Ok(url)
    }
}

struct Actor {
    outbound: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Event transport over websocket with a long-polling fallback
///
/// Connection attempts, reconnection and inbound dispatch run in a
/// background actor started by [`EventTransport::connect`].
pub struct SocketTransport {
    options: Arc<SocketOptions>,
    http: reqwest::Client,
    bus: Arc<EventBus>,
    connected: Arc<AtomicBool>,
    actor: Mutex<Option<Actor>>,
}

impl SocketTransport {
    /// Create a builder for configuring the transport
    pub fn builder() -> SocketTransportBuilder {
        SocketTransportBuilder::new()
    }

    /// Transport for `endpoint` with default settings. Does not connect.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::builder().endpoint(endpoint).build()
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl EventTransport for SocketTransport {
    fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn connect(&self) {
        let mut actor = self.actor.lock();
        if actor.as_ref().is_some_and(|running| !running.task.is_finished()) {
            debug!("connect ignored, connection already running");
            return;
        }

        let (outbound, queue) = mpsc::channel(self.options.outbound_capacity);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&self.options),
            self.http.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.connected),
            queue,
            shutdown.clone(),
        ));

        *actor = Some(Actor {
            outbound,
            shutdown,
            task,
        });
    }

    fn disconnect(&self) {
        if let Some(actor) = self.actor.lock().take() {
            actor.shutdown.cancel();
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, data: Value) -> Result<()> {
        let outbound = self
            .actor
            .lock()
            .as_ref()
            .map(|actor| actor.outbound.clone())
            .ok_or(Error::NotConnected)?;

        outbound
            .try_send(Frame::new(event, data))
            .map_err(|err| match err {
                TrySendError::Full(frame) => {
                    warn!(event = frame.event.as_str(), "outbound queue full, dropping frame");
                    Error::QueueFull(outbound.max_capacity())
                }
                TrySendError::Closed(_) => Error::NotConnected,
            })
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.get_mut().take() {
            actor.shutdown.cancel();
        }
    }
}

/// Connection actor: open, pump, and reopen within the attempt budget.
///
/// Failed connects and peer drops share one budget. Each is followed by
/// `reconnection_delay`. The budget refills once a link stays up for
/// [`STABLE_LINK`].
async fn run(
    options: Arc<SocketOptions>,
    http: reqwest::Client,
    bus: Arc<EventBus>,
    connected: Arc<AtomicBool>,
    mut outbound: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
) {
    let mut failures = 0u32;

    loop {
        let opened = tokio::select! {
            () = shutdown.cancelled() => return,
            opened = Link::negotiate(&options, &http) => opened,
        };

        let mut link = match opened {
            Ok(link) => link,
            Err(err) => {
                warn!(error = %err, attempt = failures + 1, "socket connect failed");
                bus.dispatch(CONNECT_ERROR, &json!({ "message": err.to_string() }));

                if !back_off(&options, &mut failures, &shutdown).await {
                    return;
                }
                continue;
            }
        };

        connected.store(true, Ordering::SeqCst);
        info!(protocol = %link.protocol(), sid = link.sid(), "socket connected");
        bus.dispatch(CONNECT, &Value::Null);

        let opened_at = Instant::now();
        let reason = pump(&mut link, &bus, &mut outbound, &shutdown).await;

        connected.store(false, Ordering::SeqCst);
        link.close().await;
        info!(reason, "socket disconnected");
        bus.dispatch(DISCONNECT, &Value::String(reason.to_string()));

        if reason == CLIENT_DISCONNECT {
            return;
        }
        if opened_at.elapsed() >= STABLE_LINK {
            failures = 0;
        }
        if !back_off(&options, &mut failures, &shutdown).await {
            return;
        }
    }
}

/// Spend one reconnection attempt and wait out the delay. Returns `false`
/// when the budget is exhausted or the transport is shut down meanwhile.
async fn back_off(
    options: &SocketOptions,
    failures: &mut u32,
    shutdown: &CancellationToken,
) -> bool {
    if *failures >= options.reconnection_attempts {
        error!(attempts = *failures + 1, "giving up on socket connection");
        return false;
    }
    *failures += 1;

    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(options.reconnection_delay) => true,
    }
}

/// Move frames both ways until the link ends. Returns the disconnect reason.
async fn pump(
    link: &mut Link,
    bus: &EventBus,
    outbound: &mut mpsc::Receiver<Frame>,
    shutdown: &CancellationToken,
) -> &'static str {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return CLIENT_DISCONNECT,
            frame = outbound.recv() => {
                let Some(frame) = frame else { return CLIENT_DISCONNECT };
                debug!(event = %frame.event, "emit");
                if let Err(err) = link.send(&frame).await {
                    warn!(event = %frame.event, error = %err, "emit failed");
                    return TRANSPORT_ERROR;
                }
            }
            inbound = link.recv() => match inbound {
                Some(Ok(frame)) => {
                    let observers = bus.dispatch(&frame.event, &frame.data);
                    debug!(event = %frame.event, observers, "inbound event");
                }
                Some(Err(err)) => {
                    warn!(error = %err, "socket link failed");
                    return TRANSPORT_ERROR;
                }
                None => return TRANSPORT_CLOSE,
            },
        }
    }
}

/// Builder for configuring a [`SocketTransport`]
#[derive(Default)]
pub struct SocketTransportBuilder {
    endpoint: Option<String>,
    path: Option<String>,
    protocols: Option<Vec<Protocol>>,
    connect_timeout: Option<Duration>,
    reconnection_attempts: Option<u32>,
    reconnection_delay: Option<Duration>,
    outbound_capacity: Option<usize>,
    http: Option<reqwest::Client>,
}

impl SocketTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL of the server (`http(s)://host:port`)
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the protocol negotiation order
    pub fn protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.protocols = Some(protocols.into_iter().collect());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = Some(attempts);
        self
    }

    pub fn reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = Some(delay);
        self
    }

    /// Set how many emits may queue while (re)connecting
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = Some(capacity);
        self
    }

    /// Reuse an HTTP client for the polling protocol
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the transport without connecting
    pub fn build(self) -> Result<SocketTransport> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::Custom("Endpoint not set".to_string()))?;
        let endpoint =
            Url::parse(&endpoint).map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;

        let protocols = self
            .protocols
            .unwrap_or_else(|| vec![Protocol::WebSocket, Protocol::Polling]);
        if protocols.is_empty() {
            return Err(Error::Custom("At least one protocol is required".to_string()));
        }

        let options = SocketOptions {
            endpoint,
            path: self.path.unwrap_or_else(|| DEFAULT_PATH.to_string()),
            protocols,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            reconnection_attempts: self
                .reconnection_attempts
                .unwrap_or(DEFAULT_RECONNECTION_ATTEMPTS),
            reconnection_delay: self.reconnection_delay.unwrap_or(DEFAULT_RECONNECTION_DELAY),
            outbound_capacity: self
                .outbound_capacity
                .unwrap_or(DEFAULT_OUTBOUND_CAPACITY)
                .max(1),
        };
        // Validate both derived URLs up front so connect never fails on config.
        for &protocol in &options.protocols {
            options.link_url(protocol, None)?;
        }

        Ok(SocketTransport {
            options: Arc::new(options),
            http: self.http.unwrap_or_default(),
            bus: Arc::new(EventBus::new()),
            connected: Arc::new(AtomicBool::new(false)),
            actor: Mutex::new(None),
        })
    }
}
