//! Configuration module for the call bridge gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::realtime::RealtimeConfig;
use crate::core::transfer::{TWILIO_API_BASE, TwilioCallControlConfig};

/// Default listening port
pub const DEFAULT_PORT: u16 = 5050;

/// Behavior script used when none is configured
pub const DEFAULT_INSTRUCTIONS: &str = "You are a friendly phone assistant for a small insurance agency. \
Keep answers short and conversational. Before the call ends, record the call with \
record_call_data. If the caller asks for a person, check line availability with check_status \
and offer a transfer with transfer_to_human.";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// API secret authentication entry with a client identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway, including:
/// - Server settings (host, port, TLS, public host for stream URLs)
/// - Realtime model settings (API key, model, voice, behavior script)
/// - Telephony settings (REST credentials, transfer webhook, transfer lines)
/// - Authentication settings for the admin surface
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Public host name used in the media stream URL handed to the telephony
    /// platform. Falls back to the request `Host` header.
    pub public_host: Option<String>,

    // Realtime model settings
    pub openai_api_key: Option<String>,
    pub realtime_model: String,
    pub voice: String,
    pub temperature: f32,
    /// Behavior script sent as session instructions
    pub instructions: String,
    pub greeting_prompt: Option<String>,

    // Telephony settings
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    /// Public URL of `/twiml/transfer`
    pub transfer_webhook_url: Option<String>,
    /// Public base URL for dial callbacks (no trailing slash)
    pub twilio_callback_base: Option<String>,
    /// Caller id presented on the transfer leg (E.164)
    pub twilio_caller_id: Option<String>,
    /// REST API base, overridable for tests and regional edges
    pub twilio_api_base: String,
    /// Transfer line number (1..=3) to destination
    pub transfer_lines: BTreeMap<u8, String>,
    pub transfer_timeout_seconds: u64,
    pub dial_timeout_seconds: u64,

    // Authentication configuration
    pub auth_api_secrets: Vec<AuthApiSecret>,
    pub auth_required: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent media stream connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.twilio_auth_token {
            token.zeroize();
        }
        for secret in &mut self.auth_api_secrets {
            secret.secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// The .env file is loaded in main.rs before this is called, so its values
    /// are visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_twilio_credentials(&self.twilio_account_sid, &self.twilio_auth_token)?;
        validation::validate_transfer_lines(&self.transfer_lines)?;
        validation::validate_auth_api_secrets(&self.auth_api_secrets)?;
        validation::validate_auth_required(self.auth_required, &self.auth_api_secrets)?;
        validation::validate_temperature(self.temperature)?;
        validation::validate_voice(&self.voice)?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Check if API secret authentication is configured
    pub fn has_api_secret_auth(&self) -> bool {
        !self.auth_api_secrets.is_empty()
    }

    /// Find the API secret identifier that matches a bearer token
    pub fn find_api_secret_id(&self, token: &str) -> Option<&str> {
        use subtle::ConstantTimeEq;

        self.auth_api_secrets
            .iter()
            .find(|entry| bool::from(entry.secret.as_bytes().ct_eq(token.as_bytes())))
            .map(|entry| entry.id.as_str())
    }

    /// Realtime model settings for one call
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            model: self.realtime_model.clone(),
            voice: self.voice.clone(),
            temperature: self.temperature,
            instructions: self.instructions.clone(),
            greeting_prompt: self.greeting_prompt.clone(),
            ..Default::default()
        }
    }

    /// Call-control settings, when REST credentials and the transfer webhook
    /// are all configured
    pub fn call_control_config(&self) -> Option<TwilioCallControlConfig> {
        Some(TwilioCallControlConfig {
            account_sid: self.twilio_account_sid.clone()?,
            auth_token: self.twilio_auth_token.clone()?,
            transfer_webhook_url: self.transfer_webhook_url.clone()?,
            api_base: self.twilio_api_base.clone(),
        })
    }

    /// Base URL for dial callbacks
    ///
    /// Uses `TWILIO_CALLBACK_BASE`, otherwise derives it from the public host.
    pub fn callback_base(&self) -> Option<String> {
        if let Some(base) = &self.twilio_callback_base {
            return Some(base.trim_end_matches('/').to_string());
        }
        self.public_host
            .as_ref()
            .map(|host| format!("https://{}", host.trim_end_matches('/')))
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            public_host: None,
            openai_api_key: None,
            realtime_model: crate::core::realtime::openai::DEFAULT_REALTIME_MODEL.to_string(),
            voice: crate::core::realtime::openai::DEFAULT_REALTIME_VOICE.to_string(),
            temperature: crate::core::realtime::openai::DEFAULT_TEMPERATURE,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            greeting_prompt: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            transfer_webhook_url: None,
            twilio_callback_base: None,
            twilio_caller_id: None,
            twilio_api_base: TWILIO_API_BASE.to_string(),
            transfer_lines: BTreeMap::new(),
            transfer_timeout_seconds: crate::core::transfer::TRANSFER_TIMEOUT.as_secs(),
            dial_timeout_seconds: u64::from(crate::core::transfer::DEFAULT_DIAL_TIMEOUT_SECS),
            auth_api_secrets: Vec::new(),
            auth_required: false,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

pub(crate) fn parse_auth_api_secrets_json(
    json_str: &str,
) -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    #[derive(serde::Deserialize)]
    struct AuthApiSecretJson {
        id: String,
        secret: String,
    }

    let secrets: Vec<AuthApiSecretJson> = serde_json::from_str(json_str)
        .map_err(|e| format!("Invalid AUTH_API_SECRETS_JSON format: {e}"))?;

    Ok(secrets
        .into_iter()
        .map(|entry| AuthApiSecret {
            id: entry.id,
            secret: entry.secret,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for key in [
                "HOST",
                "PORT",
                "PUBLIC_HOST",
                "OPENAI_API_KEY",
                "REALTIME_MODEL",
                "VOICE",
                "TEMPERATURE",
                "INSTRUCTIONS",
                "INSTRUCTIONS_PATH",
                "GREETING_PROMPT",
                "TWILIO_ACCOUNT_SID",
                "TWILIO_AUTH_TOKEN",
                "TRANSFER_WEBHOOK_URL",
                "TWILIO_CALLBACK_BASE",
                "TWILIO_CALLER_ID",
                "TWILIO_API_BASE",
                "TRANSFER_LINE_1",
                "TRANSFER_LINE_2",
                "TRANSFER_LINE_3",
                "TRANSFER_TIMEOUT_SECONDS",
                "DIAL_TIMEOUT_SECONDS",
                "AUTH_REQUIRED",
                "AUTH_API_SECRETS_JSON",
                "AUTH_API_SECRET",
                "AUTH_API_SECRET_ID",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
            ] {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_address_and_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "0.0.0.0:5050");
        assert!(!config.is_tls_enabled());
        assert_eq!(config.transfer_timeout(), Duration::from_secs(70));
        assert_eq!(config.dial_timeout_seconds, 25);
        assert_eq!(config.voice, "marin");
    }

    #[test]
    fn test_find_api_secret_id() {
        let mut config = ServerConfig::default();
        config.auth_api_secrets = vec![
            AuthApiSecret {
                id: "ops".to_string(),
                secret: "secret-a".to_string(),
            },
            AuthApiSecret {
                id: "dashboard".to_string(),
                secret: "secret-b".to_string(),
            },
        ];
        assert_eq!(config.find_api_secret_id("secret-b"), Some("dashboard"));
        assert_eq!(config.find_api_secret_id("secret-c"), None);
    }

    #[test]
    fn test_call_control_config_requires_all_parts() {
        let mut config = ServerConfig::default();
        config.twilio_account_sid = Some("AC123".to_string());
        config.twilio_auth_token = Some("token".to_string());
        assert!(config.call_control_config().is_none());

        config.transfer_webhook_url = Some("https://bridge.example.com/twiml/transfer".to_string());
        let control = config.call_control_config().unwrap();
        assert_eq!(control.account_sid, "AC123");
        assert_eq!(control.api_base, TWILIO_API_BASE);
    }

    #[test]
    fn test_callback_base_fallback() {
        let mut config = ServerConfig::default();
        config.public_host = Some("bridge.example.com".to_string());
        assert_eq!(
            config.callback_base().as_deref(),
            Some("https://bridge.example.com")
        );

        config.twilio_callback_base = Some("https://cb.example.com/".to_string());
        assert_eq!(config.callback_base().as_deref(), Some("https://cb.example.com"));
    }

    #[test]
    fn test_realtime_config_mapping() {
        let mut config = ServerConfig::default();
        config.openai_api_key = Some("sk-test".to_string());
        config.greeting_prompt = Some("Say hi".to_string());
        let realtime = config.realtime_config();
        assert_eq!(realtime.api_key, "sk-test");
        assert_eq!(realtime.model, "gpt-realtime");
        assert_eq!(realtime.greeting_prompt.as_deref(), Some("Say hi"));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_transfer_lines() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "6060");
            env::set_var("TRANSFER_LINE_1", "+1 (352) 665-9393");
            env::set_var("TRANSFER_LINE_3", "+17185551234");
            env::set_var("TRANSFER_TIMEOUT_SECONDS", "30");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 6060);
        assert_eq!(config.transfer_lines.get(&1).map(String::as_str), Some("+13526659393"));
        assert_eq!(config.transfer_lines.get(&3).map(String::as_str), Some("+17185551234"));
        assert!(!config.transfer_lines.contains_key(&2));
        assert_eq!(config.transfer_timeout(), Duration::from_secs(30));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_half_configured_twilio() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TWILIO_ACCOUNT_SID", "AC123");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TWILIO_AUTH_TOKEN"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_host: "bridge.example.com"

realtime:
  api_key: "yaml-key"
  voice: "alloy"

telephony:
  lines:
    2: "+12125551234"
  transfer_timeout_seconds: 45
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("OPENAI_API_KEY", "env-key");
            env::set_var("TRANSFER_LINE_1", "+13526659393");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_host.as_deref(), Some("bridge.example.com"));
        assert_eq!(config.openai_api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.voice, "alloy");
        // env lines survive, YAML lines are added
        assert_eq!(config.transfer_lines.len(), 2);
        assert_eq!(config.transfer_timeout_seconds, 45);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_instructions_path() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let script_path = temp_dir.path().join("script.txt");
        fs::write(&script_path, "Only speak Spanish.").unwrap();

        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = format!(
            "realtime:\n  instructions_path: \"{}\"\n",
            script_path.display()
        );
        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.instructions, "Only speak Spanish.");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let result = ServerConfig::from_file(&PathBuf::from("/nonexistent/config.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_line_number() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "telephony:\n  lines:\n    4: \"+12125551234\"\n").unwrap();

        let err = ServerConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("line"));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_voice() {
        cleanup_env_vars();
        unsafe {
            env::set_var("VOICE", "robot");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Unknown VOICE 'robot'"));

        cleanup_env_vars();
    }
}
