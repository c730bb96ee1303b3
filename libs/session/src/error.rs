use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An event-based operation had no usable transport.
    #[error("Event transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    /// The server answered on the operation's error event.
    #[error("{message}")]
    Server {
        operation: &'static str,
        message: String,
        payload: Value,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Non-2xx document response. `message` is the server's detail or a
    /// generic description of the failed call.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Cannot connect to backend at {url}. Make sure the server is running ({message})")]
    Network { url: String, message: String },

    #[error("Session closed")]
    SessionClosed,

    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("{operation} payload must serialize to a JSON object")]
    InvalidPayload { operation: &'static str },

    #[error("Malformed {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] orrery_fabric::Error),
}

impl Error {
    /// Rejection carrying the payload of a server error event.
    pub fn server(operation: &'static str, payload: Value) -> Self {
        Self::Server {
            operation,
            message: server_message(&payload),
            payload,
        }
    }

    /// Map a failed document call. `operation` names the call in decode
    /// errors; `fallback` stands in when the server gave no detail.
    pub(crate) fn document(
        err: orrery_fabric::Error,
        operation: &'static str,
        fallback: &'static str,
    ) -> Self {
        match err {
            orrery_fabric::Error::Http { status, detail } => Self::Http {
                status,
                message: detail.unwrap_or_else(|| fallback.to_string()),
            },
            orrery_fabric::Error::Network { url, message } => Self::Network { url, message },
            orrery_fabric::Error::Codec(message) => Self::Decode { operation, message },
            other => Self::Transport(other),
        }
    }

    /// Map a failed emission. A transport with no running connection, or
    /// one too backed up to take the frame, is reported as unavailable.
    pub(crate) fn emit(err: orrery_fabric::Error) -> Self {
        match err {
            orrery_fabric::Error::NotConnected => Self::TransportUnavailable {
                reason: "socket is not connected".to_string(),
            },
            full @ orrery_fabric::Error::QueueFull(_) => Self::TransportUnavailable {
                reason: full.to_string(),
            },
            other => Self::Transport(other),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Human-readable text of a server error payload.
fn server_message(payload: &Value) -> String {
    if let Some(text) = payload.as_str() {
        return text.to_string();
    }
    ["message", "error", "detail"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .map_or_else(|| payload.to_string(), str::to_string)
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_message_prefers_known_fields() {
        assert_eq!(server_message(&json!("model offline")), "model offline");
        assert_eq!(server_message(&json!({ "message": "busy" })), "busy");
        assert_eq!(server_message(&json!({ "error": "bad audio" })), "bad audio");
        assert_eq!(server_message(&json!({ "code": 7 })), r#"{"code":7}"#);
    }

    #[test]
    fn timeout_names_operation_and_bound() {
        let err = Error::Timeout {
            operation: "Chat request",
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Chat request timed out after 5s");
        assert!(err.is_timeout());
    }

    #[test]
    fn document_errors_fall_back_to_generic_message() {
        let err = Error::document(
            orrery_fabric::Error::Http {
                status: 500,
                detail: None,
            },
            "Universe fetch",
            "Failed to fetch universe",
        );
        assert_eq!(err.to_string(), "Failed to fetch universe");

        let err = Error::document(
            orrery_fabric::Error::Http {
                status: 404,
                detail: Some("not found".to_string()),
            },
            "Universe fetch",
            "Failed to fetch universe",
        );
        assert_eq!(err.to_string(), "not found");
    }

    #[test]
    fn undecodable_documents_name_the_operation() {
        let err = Error::document(
            orrery_fabric::Error::Codec("missing field `id`".to_string()),
            "Universe fetch",
            "Failed to fetch universe",
        );
        assert_eq!(
            err.to_string(),
            "Malformed Universe fetch response: missing field `id`"
        );
    }

    #[test]
    fn not_connected_emits_are_unavailable() {
        assert!(matches!(
            Error::emit(orrery_fabric::Error::NotConnected),
            Error::TransportUnavailable { .. }
        ));
    }

    #[test]
    fn full_queue_emits_are_unavailable() {
        let err = Error::emit(orrery_fabric::Error::QueueFull(64));
        assert!(matches!(err, Error::TransportUnavailable { .. }));
        assert_eq!(
            err.to_string(),
            "Event transport unavailable: Outbound queue full (64 frames)"
        );
    }
}
