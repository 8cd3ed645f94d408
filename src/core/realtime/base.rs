//! Base types for the realtime model connection.
//!
//! The conversational model is an opaque remote service reached over a
//! message-based streaming connection. This module holds the error type and
//! the connection configuration shared by the provider implementation and the
//! bridge.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::openai::{
    DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE, DEFAULT_TEMPERATURE, OPENAI_REALTIME_URL,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the model connection.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The connection is closed or was never opened
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the realtime model connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint, without query parameters
    #[serde(default = "default_url")]
    pub url: String,

    /// Model name (e.g., "gpt-realtime")
    #[serde(default = "default_model")]
    pub model: String,

    /// Output voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Behavior script sent verbatim as session instructions
    #[serde(default)]
    pub instructions: String,

    /// Synthetic first user message that starts the conversation
    #[serde(default)]
    pub greeting_prompt: Option<String>,
}

fn default_url() -> String {
    OPENAI_REALTIME_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_REALTIME_MODEL.to_string()
}

fn default_voice() -> String {
    DEFAULT_REALTIME_VOICE.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: default_url(),
            model: default_model(),
            voice: default_voice(),
            temperature: default_temperature(),
            instructions: String::new(),
            greeting_prompt: None,
        }
    }
}

impl RealtimeConfig {
    /// Check the settings needed to open a connection.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .field("instructions_len", &self.instructions.len())
            .field("greeting_prompt", &self.greeting_prompt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert!(config.api_key.is_empty());
        assert_eq!(config.model, "gpt-realtime");
        assert_eq!(config.voice, "marin");
        assert_eq!(config.temperature, 0.8);
        assert!(config.greeting_prompt.is_none());
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = RealtimeConfig::default();
        assert!(matches!(
            config.validate(),
            Err(RealtimeError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_validate_temperature_range() {
        let config = RealtimeConfig {
            api_key: "sk-test".to_string(),
            temperature: 2.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RealtimeConfig {
            api_key: "sk-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_error_display() {
        let err = RealtimeError::ConnectionFailed("test".to_string());
        assert!(err.to_string().contains("Connection failed"));
        assert_eq!(RealtimeError::NotConnected.to_string(), "Not connected");
    }
}
