//! Event names spoken over the persistent transport.

/// The request-style operations a session issues. Each has its own
/// response bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Narration,
    Chat,
    SpeechInput,
    SpeechOutput,
}

/// A request-style operation and the events that settle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    /// Used in logs and timeout messages.
    pub name: &'static str,
    pub request: &'static str,
    pub response: &'static str,
    pub error: &'static str,
}

pub const NARRATION: Operation = Operation {
    kind: OperationKind::Narration,
    name: "Narration request",
    request: "request_narration",
    response: "narration_response",
    error: "narration_error",
};

pub const CHAT: Operation = Operation {
    kind: OperationKind::Chat,
    name: "Chat request",
    request: "chat_message",
    response: "chat_response",
    error: "chat_error",
};

pub const SPEECH_INPUT: Operation = Operation {
    kind: OperationKind::SpeechInput,
    name: "Speech transcription",
    request: "speech_input",
    response: "speech_input_response",
    error: "speech_input_error",
};

pub const SPEECH_OUTPUT: Operation = Operation {
    kind: OperationKind::SpeechOutput,
    name: "Speech synthesis",
    request: "speech_output",
    response: "speech_output_response",
    error: "speech_output_error",
};

/// Server-initiated navigation; never acknowledged.
pub const NAVIGATE_TO: &str = "navigate_to";

/// Server greeting sent after the link opens. Payload carries `message`.
pub const CONNECTION_ESTABLISHED: &str = "connection_established";

/// Key the client adds to every request and the server echoes back.
pub const CORRELATION_KEY: &str = "correlation_id";
