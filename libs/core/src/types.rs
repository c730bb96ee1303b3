//! Records exchanged with the orrery server.
//!
//! Most domain payloads are owned by the server and treated as opaque JSON
//! objects; only the speech and listing shapes are fixed on the client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Name of a JSON value's kind, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

macro_rules! opaque_record {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub Map<String, Value>);

            impl $name {
                pub fn new() -> Self {
                    Self::default()
                }

                /// Builder-style field insert.
                #[must_use]
                pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
                    self.0.insert(key.into(), value.into());
                    self
                }

                pub fn get(&self, key: &str) -> Option<&Value> {
                    self.0.get(key)
                }

                pub fn into_inner(self) -> Map<String, Value> {
                    self.0
                }
            }

            impl TryFrom<Value> for $name {
                type Error = Error;

                fn try_from(value: Value) -> Result<Self> {
                    match value {
                        Value::Object(fields) => Ok(Self(fields)),
                        other => Err(Error::InvalidRecord {
                            record: stringify!($name),
                            found: json_kind(&other),
                        }),
                    }
                }
            }

            impl From<$name> for Value {
                fn from(record: $name) -> Self {
                    Value::Object(record.0)
                }
            }
        )+
    };
}

opaque_record! {
    /// A body in a universe (star, planet, moon...).
    CelestialObject;
    /// Request for narration about an object or a scene.
    NarrationRequest;
    NarrationResponse;
    ChatMessage;
    ChatResponse;
    /// Server-initiated instruction to move the view.
    NavigationAction;
    UniverseGenerationRequest;
    GeneratedUniverse;
    UniverseTemplate;
}

/// Response of `GET /universe/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub objects: Vec<CelestialObject>,
}

/// Response of `GET /universe/templates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateList {
    pub templates: Vec<UniverseTemplate>,
}

/// A chat message, optionally scoped to a universe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(flatten)]
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universe_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: ChatMessage) -> Self {
        Self {
            message,
            universe_id: None,
        }
    }

    #[must_use]
    pub fn in_universe(mut self, universe_id: impl Into<String>) -> Self {
        self.universe_id = Some(universe_id.into());
        self
    }
}

/// Audio to transcribe. `audio_data` is base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechInputRequest {
    pub audio_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_width: Option<u32>,
}

impl SpeechInputRequest {
    pub fn new(audio_data: impl Into<String>) -> Self {
        Self {
            audio_data: audio_data.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechInputResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_VOICE_TYPE: &str = "neural";

/// Text to synthesize into speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechOutputRequest {
    pub text: String,
    pub language: String,
    pub voice_type: String,
}

impl SpeechOutputRequest {
    /// English text with the neural voice.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            voice_type: DEFAULT_VOICE_TYPE.to_string(),
        }
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn voice_type(mut self, voice_type: impl Into<String>) -> Self {
        self.voice_type = voice_type.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechOutputResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    pub native_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableLanguages {
    pub languages: Vec<LanguageInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opaque_record_keeps_unknown_fields() {
        let value = json!({ "text": "Hello", "voice": { "id": 3 } });
        let response = NarrationResponse::try_from(value.clone()).unwrap();

        assert_eq!(response.get("text"), Some(&json!("Hello")));
        assert_eq!(serde_json::to_value(&response).unwrap(), value);
    }

    #[test]
    fn opaque_record_rejects_non_objects() {
        let err = NavigationAction::try_from(json!([1, 2])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "NavigationAction must be a JSON object, found an array"
        );
    }

    #[test]
    fn chat_request_flattens_message() {
        let request = ChatRequest::new(ChatMessage::new().with("message", "where is Mars?"))
            .in_universe("sol");

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "message": "where is Mars?", "universe_id": "sol" })
        );

        let anonymous = ChatRequest::new(ChatMessage::new().with("message", "hi"));
        assert_eq!(
            serde_json::to_value(&anonymous).unwrap(),
            json!({ "message": "hi" })
        );
    }

    #[test]
    fn speech_output_defaults() {
        let request = SpeechOutputRequest::new("Welcome aboard");
        assert_eq!(request.language, "en");
        assert_eq!(request.voice_type, "neural");
    }

    #[test]
    fn speech_input_omits_unset_fields() {
        let request = SpeechInputRequest::new("UklGRg==");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "audio_data": "UklGRg==" })
        );
    }
}
