//! Engine configuration.

use std::time::Duration;

use parley_proto::{CONVERSATION_PLACEHOLDER, Destinations, Topics};
use serde::{Deserialize, Serialize};

use crate::SyncError;

/// Quiet period after the last compose edit before typing state is evaluated.
pub const DEFAULT_TYPING_DEBOUNCE: Duration = Duration::from_millis(200);

/// Lease on a remote "is typing" signal. Expires unless refreshed.
pub const DEFAULT_TYPING_LIVENESS: Duration = Duration::from_millis(2500);

/// Longest message accepted by the send pipeline, in characters.
pub const DEFAULT_MAX_CONTENT_LEN: usize = 4000;

/// Synchronization engine configuration.
///
/// Deserializable with every field optional; missing fields take their
/// defaults. Durations are expressed in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Compose debounce window.
    #[serde(rename = "typing_debounce_ms", with = "millis")]
    pub typing_debounce: Duration,
    /// Remote typing lease.
    #[serde(rename = "typing_liveness_ms", with = "millis")]
    pub typing_liveness: Duration,
    /// Maximum outbound message length in characters.
    pub max_content_len: usize,
    /// Outbound destinations.
    pub destinations: Destinations,
    /// Inbound topics.
    pub topics: Topics,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            typing_debounce: DEFAULT_TYPING_DEBOUNCE,
            typing_liveness: DEFAULT_TYPING_LIVENESS,
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
            destinations: Destinations::default(),
            topics: Topics::default(),
        }
    }
}

impl SyncConfig {
    /// Check that the configuration can drive an engine.
    ///
    /// # Errors
    ///
    /// - `SyncError::InvalidConfig` if a window is zero, the typing lease is
    ///   not longer than the debounce window, or the typing topic template
    ///   lacks the conversation placeholder
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.typing_debounce.is_zero() || self.typing_liveness.is_zero() {
            return Err(SyncError::InvalidConfig("typing windows must be non-zero".into()));
        }

        if self.typing_liveness <= self.typing_debounce {
            return Err(SyncError::InvalidConfig(format!(
                "typing liveness ({:?}) must exceed debounce ({:?})",
                self.typing_liveness, self.typing_debounce
            )));
        }

        if !self.topics.typing.contains(CONVERSATION_PLACEHOLDER) {
            return Err(SyncError::InvalidConfig(format!(
                "typing topic {:?} lacks {CONVERSATION_PLACEHOLDER}",
                self.topics.typing
            )));
        }

        if self.max_content_len == 0 {
            return Err(SyncError::InvalidConfig("max_content_len must be non-zero".into()));
        }

        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"typing_liveness_ms": 5000}"#).unwrap();
        assert_eq!(config.typing_liveness, Duration::from_secs(5));
        assert_eq!(config.typing_debounce, DEFAULT_TYPING_DEBOUNCE);
        assert_eq!(config.topics, Topics::default());
    }

    #[test]
    fn liveness_must_exceed_debounce() {
        let config = SyncConfig { typing_liveness: Duration::from_millis(100), ..Default::default() };
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn typing_topic_needs_placeholder() {
        let mut config = SyncConfig::default();
        config.topics.typing = "/topic/typing".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }
}
