use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Operation, OperationKind};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000";
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

pub const ENV_ENDPOINT: &str = "ORRERY_API_URL";
pub const ENV_SOCKET_PATH: &str = "ORRERY_SOCKET_PATH";
pub const ENV_CONNECT_CEILING_MS: &str = "ORRERY_CONNECT_CEILING_MS";
pub const ENV_NARRATION_TIMEOUT_MS: &str = "ORRERY_NARRATION_TIMEOUT_MS";
pub const ENV_CHAT_TIMEOUT_MS: &str = "ORRERY_CHAT_TIMEOUT_MS";

/// Everything a [`Session`](crate::Session) needs to reach the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Base URL shared by both transports.
    pub endpoint: String,
    pub socket_path: String,
    /// Bound on opening one socket link.
    pub connect_timeout_ms: u64,
    pub reconnection_attempts: u32,
    pub reconnection_delay_ms: u64,
    pub timeouts: CallTimeouts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            connect_timeout_ms: 20_000,
            reconnection_attempts: 3,
            reconnection_delay_ms: 1_000,
            timeouts: CallTimeouts::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by the `ORRERY_*` environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load a JSON config file, then apply the environment on top.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        config.apply_env_overrides();
        debug!(path = %path.display(), endpoint = %config.endpoint, "loaded session config");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(path) = lookup(ENV_SOCKET_PATH).filter(|v| !v.trim().is_empty()) {
            self.socket_path = path;
        }

        let millis = |key: &str| {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(ms) => Some(ms),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring non-numeric override");
                    None
                }
            }
        };
        if let Some(ms) = millis(ENV_CONNECT_CEILING_MS) {
            self.timeouts.connect_ceiling_ms = ms;
        }
        if let Some(ms) = millis(ENV_NARRATION_TIMEOUT_MS) {
            self.timeouts.narration_ms = ms;
        }
        if let Some(ms) = millis(ENV_CHAT_TIMEOUT_MS) {
            self.timeouts.chat_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::Config("endpoint must not be empty".to_string()));
        }
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(Error::Config(format!(
                "unsupported endpoint scheme: {}",
                url.scheme()
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be positive".to_string()));
        }
        self.timeouts.validate()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }
}

/// Per-operation response bounds, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTimeouts {
    /// How long `ensure_ready` waits for the link before proceeding anyway.
    pub connect_ceiling_ms: u64,
    pub narration_ms: u64,
    pub chat_ms: u64,
    pub speech_input_ms: u64,
    pub speech_output_ms: u64,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            connect_ceiling_ms: 5_000,
            narration_ms: 10_000,
            chat_ms: 5_000,
            speech_input_ms: 10_000,
            speech_output_ms: 10_000,
        }
    }
}

impl CallTimeouts {
    pub fn connect_ceiling(&self) -> Duration {
        Duration::from_millis(self.connect_ceiling_ms)
    }

    pub fn for_operation(&self, operation: &Operation) -> Duration {
        let ms = match operation.kind {
            OperationKind::Narration => self.narration_ms,
            OperationKind::Chat => self.chat_ms,
            OperationKind::SpeechInput => self.speech_input_ms,
            OperationKind::SpeechOutput => self.speech_output_ms,
        };
        Duration::from_millis(ms)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("connect_ceiling_ms", self.connect_ceiling_ms),
            ("narration_ms", self.narration_ms),
            ("chat_ms", self.chat_ms),
            ("speech_input_ms", self.speech_input_ms),
            ("speech_output_ms", self.speech_output_ms),
        ];
        match fields.iter().find(|(_, ms)| *ms == 0) {
            Some((name, _)) => Err(Error::Config(format!("timeouts.{name} must be positive"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::protocol;

    #[test]
    fn defaults_match_the_backend() {
        let config = SessionConfig::default();
        assert_eq!(config.endpoint, "http://localhost:3000");
        assert_eq!(config.socket_path, "/socket.io/");
        assert_eq!(config.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.reconnection_attempts, 3);
        assert_eq!(config.reconnection_delay(), Duration::from_secs(1));

        let timeouts = &config.timeouts;
        assert_eq!(timeouts.connect_ceiling(), Duration::from_secs(5));
        assert_eq!(timeouts.for_operation(&protocol::NARRATION), Duration::from_secs(10));
        assert_eq!(timeouts.for_operation(&protocol::CHAT), Duration::from_secs(5));
        assert_eq!(timeouts.for_operation(&protocol::SPEECH_INPUT), Duration::from_secs(10));
        assert_eq!(timeouts.for_operation(&protocol::SPEECH_OUTPUT), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn each_operation_uses_its_own_timeout() {
        let timeouts = CallTimeouts {
            connect_ceiling_ms: 1,
            narration_ms: 11,
            chat_ms: 22,
            speech_input_ms: 33,
            speech_output_ms: 44,
        };
        let cases = [
            (protocol::NARRATION, 11),
            (protocol::CHAT, 22),
            (protocol::SPEECH_INPUT, 33),
            (protocol::SPEECH_OUTPUT, 44),
        ];
        for (operation, ms) in cases {
            assert_eq!(
                timeouts.for_operation(&operation),
                Duration::from_millis(ms),
                "{}",
                operation.name
            );
        }
    }

    #[test]
    fn overrides_replace_only_what_is_set() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_ENDPOINT, "https://orrery.example"),
            (ENV_CHAT_TIMEOUT_MS, "750"),
            (ENV_NARRATION_TIMEOUT_MS, "soon"),
        ]);
        let mut config = SessionConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoint, "https://orrery.example");
        assert_eq!(config.timeouts.chat_ms, 750);
        assert_eq!(config.timeouts.narration_ms, 10_000);
        assert_eq!(config.socket_path, DEFAULT_SOCKET_PATH);
    }

    #[test]
    fn file_values_sit_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "endpoint": "http://10.0.0.2:8000", "timeouts": {{ "chat_ms": 2500 }} }}"#
        )
        .unwrap();

        let config = SessionConfig::from_path(file.path()).unwrap();
        if std::env::var(ENV_ENDPOINT).is_err() {
            assert_eq!(config.endpoint, "http://10.0.0.2:8000");
        }
        if std::env::var(ENV_CHAT_TIMEOUT_MS).is_err() {
            assert_eq!(config.timeouts.chat_ms, 2500);
        }
        assert_eq!(config.timeouts.speech_input_ms, 10_000);
        assert_eq!(config.reconnection_attempts, 3);
    }

    #[test]
    fn unreadable_files_are_config_errors() {
        let err = SessionConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("not a url").validate().is_err());
        assert!(SessionConfig::new("ftp://host").validate().is_err());

        let mut config = SessionConfig::default();
        config.timeouts.chat_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: timeouts.chat_ms must be positive"
        );
    }
}
