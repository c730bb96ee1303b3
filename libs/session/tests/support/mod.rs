#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orrery_fabric::transport::lifecycle;
use orrery_fabric::{EventBus, EventTransport};
use orrery_session::{Result, Session, SessionConfig, TransportFactory};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

/// How a fake transport reacts to `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Fires `connect` on the next scheduler turn.
    Immediate,
    /// Never fires anything; the test drives lifecycle events.
    Manual,
}

/// Scripted event transport. Emitted frames are forwarded to a channel and
/// inbound events are injected with [`FakeTransport::fire`].
pub struct FakeTransport {
    bus: Arc<EventBus>,
    mode: ConnectMode,
    connects: AtomicUsize,
    connected: AtomicBool,
    refuse_emits: AtomicBool,
    stall_emits: AtomicBool,
    emitted: mpsc::UnboundedSender<(String, Value)>,
}

impl FakeTransport {
    pub fn new(mode: ConnectMode) -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Value)>) {
        let (emitted, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            bus: Arc::new(EventBus::new()),
            mode,
            connects: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            refuse_emits: AtomicBool::new(false),
            stall_emits: AtomicBool::new(false),
            emitted,
        });
        (transport, rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn refuse_emits(&self) {
        self.refuse_emits.store(true, Ordering::SeqCst);
    }

    /// Make every later `emit` hang, like a send into a queue nobody drains.
    pub fn stall_emits(&self) {
        self.stall_emits.store(true, Ordering::SeqCst);
    }

    /// Deliver an inbound event.
    pub fn fire(&self, event: &str, payload: Value) -> usize {
        match event {
            lifecycle::CONNECT => self.connected.store(true, Ordering::SeqCst),
            lifecycle::DISCONNECT => self.connected.store(false, Ordering::SeqCst),
            _ => {}
        }
        self.bus.dispatch(event, &payload)
    }
}

#[async_trait]
impl EventTransport for FakeTransport {
    fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.mode == ConnectMode::Immediate {
            let bus = Arc::clone(&self.bus);
            self.connected.store(true, Ordering::SeqCst);
            tokio::spawn(async move {
                bus.dispatch(lifecycle::CONNECT, &Value::Null);
            });
        }
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.bus
                .dispatch(lifecycle::DISCONNECT, &Value::from(lifecycle::CLIENT_DISCONNECT));
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, data: Value) -> orrery_fabric::Result<()> {
        if self.refuse_emits.load(Ordering::SeqCst) {
            return Err(orrery_fabric::Error::NotConnected);
        }
        if self.stall_emits.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let _ = self.emitted.send((event.to_string(), data));
        Ok(())
    }
}

type Emitted = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(String, Value)>>>;

/// Factory handing out fresh fakes and remembering each one built.
pub struct FakeFactory {
    mode: ConnectMode,
    built: Mutex<Vec<(Arc<FakeTransport>, Emitted)>>,
}

impl FakeFactory {
    pub fn new(mode: ConnectMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            built: Mutex::new(Vec::new()),
        })
    }

    pub fn built(&self) -> usize {
        self.built.lock().len()
    }

    /// The most recently built transport.
    pub fn latest(&self) -> Arc<FakeTransport> {
        let built = self.built.lock();
        Arc::clone(&built.last().expect("no transport built yet").0)
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        Arc::clone(&self.built.lock()[index].0)
    }

    /// Wait until `count` transports have been built.
    pub async fn wait_built(&self, count: usize) {
        while self.built() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Next frame emitted on the most recent transport.
    pub async fn next_emitted(&self) -> (String, Value) {
        self.wait_built(1).await;
        let rx = Arc::clone(&self.built.lock().last().expect("no transport built yet").1);
        let frame = tokio::time::timeout(Duration::from_secs(30), async move {
            rx.lock().await.recv().await
        })
        .await
        .expect("nothing emitted");
        frame.expect("emit channel closed")
    }
}

impl TransportFactory for FakeFactory {
    fn create(&self, _config: &SessionConfig) -> Result<Arc<dyn EventTransport>> {
        let (transport, rx) = FakeTransport::new(self.mode);
        self.built
            .lock()
            .push((Arc::clone(&transport), Arc::new(tokio::sync::Mutex::new(rx))));
        Ok(transport)
    }
}

pub fn session(factory: &Arc<FakeFactory>) -> Session {
    orrery_core::logging::init_subscriber("orrery_session=debug");
    let factory: Arc<dyn TransportFactory> = factory.clone();
    Session::with_transport_factory(SessionConfig::default(), factory).expect("valid session config")
}
