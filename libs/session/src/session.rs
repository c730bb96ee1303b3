use std::sync::Arc;

use orrery_core::types::{
    AvailableLanguages, ChatRequest, ChatResponse, GeneratedUniverse, NarrationRequest,
    NarrationResponse, NavigationAction, SpeechInputRequest, SpeechInputResponse,
    SpeechOutputRequest, SpeechOutputResponse, TemplateList, UniverseGenerationRequest,
    UniverseSnapshot, UniverseTemplate, DEFAULT_LANGUAGE,
};
use orrery_fabric::{DocumentClient, ListenerId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{ConnectionManager, SocketFactory, TransportFactory};
use crate::correlator::CallCorrelator;
use crate::error::{Error, Result};
use crate::pending::PendingCalls;
use crate::protocol::{self, Operation};

/// Client session against one orrery backend.
///
/// Cheap to clone; clones share the transport and every pending call.
/// Lifecycle: [`Session::new`] → operations (the first event-based one
/// connects) → [`Session::teardown`]. Operations after a teardown build a
/// fresh transport.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<SessionConfig>,
    connection: ConnectionManager,
    correlator: CallCorrelator,
    documents: DocumentClient,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_transport_factory(config, Arc::new(SocketFactory))
    }

    /// Session against `endpoint` with default settings.
    pub fn create(endpoint: impl Into<String>) -> Result<Self> {
        Self::new(SessionConfig::new(endpoint))
    }

    /// Session configured from the `ORRERY_*` environment.
    pub fn from_env() -> Result<Self> {
        Self::new(SessionConfig::from_env())
    }

    pub fn with_transport_factory(
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let documents = DocumentClient::new(&config.endpoint)?;
        let config = Arc::new(config);
        let pending = Arc::new(PendingCalls::new());

        info!(endpoint = %config.endpoint, "session created");
        Ok(Self {
            inner: Arc::new(Inner {
                connection: ConnectionManager::new(
                    Arc::clone(&config),
                    factory,
                    Arc::clone(&pending),
                ),
                correlator: CallCorrelator::new(pending),
                documents,
                config,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.config.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.connection.is_initialized()
    }

    /// Number of event-based calls still awaiting settlement.
    pub fn pending_calls(&self) -> usize {
        self.inner.correlator.pending().len()
    }

    /// Build and connect the persistent transport if needed.
    ///
    /// Never fails because the link is slow: after the connect ceiling it
    /// returns anyway.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.inner.connection.ensure_ready().await.map(|_| ())
    }

    /// Reject pending calls with [`Error::SessionClosed`] and drop the
    /// transport.
    pub fn teardown(&self) {
        self.inner.connection.teardown();
    }

    pub async fn request_narration(&self, request: &NarrationRequest) -> Result<NarrationResponse> {
        self.call(&protocol::NARRATION, request).await
    }

    pub async fn send_chat_message(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.call(&protocol::CHAT, request).await
    }

    /// Transcribe audio over the socket. `language` defaults to English.
    pub async fn transcribe_speech_live(
        &self,
        audio_data: &str,
        language: Option<&str>,
    ) -> Result<SpeechInputResponse> {
        let request =
            SpeechInputRequest::new(audio_data).language(language.unwrap_or(DEFAULT_LANGUAGE));
        self.call(&protocol::SPEECH_INPUT, &request).await
    }

    /// Synthesize speech over the socket.
    pub async fn synthesize_speech_live(
        &self,
        request: &SpeechOutputRequest,
    ) -> Result<SpeechOutputResponse> {
        self.call(&protocol::SPEECH_OUTPUT, request).await
    }

    /// Invoke `callback` for every server-initiated navigation.
    ///
    /// Builds the transport if needed but does not connect it. Returns the
    /// id of the standing observer.
    pub fn on_navigate<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: Fn(NavigationAction) + Send + Sync + 'static,
    {
        let transport = self.inner.connection.ensure_constructed()?;
        let id = transport.events().on(protocol::NAVIGATE_TO, move |payload| {
            match NavigationAction::try_from(payload.clone()) {
                Ok(action) => callback(action),
                Err(e) => warn!(error = %e, "dropping malformed navigation"),
            }
        });
        debug!(?id, "navigation observer registered");
        Ok(id)
    }

    pub async fn get_universe(&self, universe_id: &str) -> Result<UniverseSnapshot> {
        self.inner
            .documents
            .get_json(&["universe", universe_id])
            .await
            .map_err(|e| Error::document(e, "Universe fetch", "Failed to fetch universe"))
    }

    pub async fn generate_universe(
        &self,
        request: &UniverseGenerationRequest,
    ) -> Result<GeneratedUniverse> {
        self.inner
            .documents
            .post_json(&["universe", "generate"], request)
            .await
            .map_err(|e| Error::document(e, "Universe generation", "Failed to generate universe"))
    }

    pub async fn list_templates(&self) -> Result<Vec<UniverseTemplate>> {
        let list: TemplateList = self
            .inner
            .documents
            .get_json(&["universe", "templates"])
            .await
            .map_err(|e| Error::document(e, "Template listing", "Failed to fetch templates"))?;
        Ok(list.templates)
    }

    pub async fn transcribe_speech(
        &self,
        request: &SpeechInputRequest,
    ) -> Result<SpeechInputResponse> {
        self.inner
            .documents
            .post_json(&["speech", "transcribe"], request)
            .await
            .map_err(|e| Error::document(e, "Speech transcription", "Failed to transcribe speech"))
    }

    pub async fn synthesize_speech(
        &self,
        request: &SpeechOutputRequest,
    ) -> Result<SpeechOutputResponse> {
        self.inner
            .documents
            .post_json(&["speech", "synthesize"], request)
            .await
            .map_err(|e| Error::document(e, "Speech synthesis", "Failed to synthesize speech"))
    }

    pub async fn available_languages(&self) -> Result<AvailableLanguages> {
        self.inner
            .documents
            .get_json(&["speech", "languages"])
            .await
            .map_err(|e| {
                Error::document(e, "Language listing", "Failed to fetch available languages")
            })
    }

    async fn call<Req, Res>(&self, operation: &Operation, payload: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized + Sync,
        Res: DeserializeOwned,
    {
        let transport = self.inner.connection.ensure_ready().await?;
        let timeout = self.inner.config.timeouts.for_operation(operation);
        self.inner
            .correlator
            .call(transport.as_ref(), operation, payload, timeout)
            .await
    }
}
