use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values set here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5050
///   public_host: "bridge.example.com"
///
/// realtime:
///   api_key: "sk-..."
///   model: "gpt-realtime"
///   voice: "marin"
///   temperature: 0.8
///   instructions_path: "/etc/callbridge/script.txt"
///   greeting_prompt: "Greet the caller."
///
/// telephony:
///   account_sid: "AC..."
///   auth_token: "..."
///   transfer_webhook_url: "https://bridge.example.com/twiml/transfer"
///   callback_base: "https://bridge.example.com"
///   caller_id: "+14155550100"
///   lines:
///     1: "+13526659393"
///     2: "+12125551234"
///   transfer_timeout_seconds: 70
///   dial_timeout_seconds: 25
///
/// auth:
///   required: true
///   api_secrets:
///     - id: "dashboard"
///       secret: "your-api-secret"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub telephony: Option<TelephonyYaml>,
    pub auth: Option<AuthYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Realtime model configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    /// Inline behavior script
    pub instructions: Option<String>,
    /// Behavior script file, wins over `instructions`
    pub instructions_path: Option<String>,
    pub greeting_prompt: Option<String>,
}

/// Telephony configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TelephonyYaml {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub transfer_webhook_url: Option<String>,
    pub callback_base: Option<String>,
    pub caller_id: Option<String>,
    pub api_base: Option<String>,
    /// Line number to destination, merged over `TRANSFER_LINE_n`
    #[serde(default)]
    pub lines: BTreeMap<u8, String>,
    pub transfer_timeout_seconds: Option<u64>,
    pub dial_timeout_seconds: Option<u64>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    /// Preferred multi-secret form. If non-empty, it takes precedence over api_secret.
    #[serde(default)]
    pub api_secrets: Vec<AuthApiSecretYaml>,
    /// Single-secret alias. Ignored when api_secrets is non-empty.
    pub api_secret: Option<String>,
}

/// API secret authentication entry in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiSecretYaml {
    pub id: String,
    pub secret: String,
}

/// Security configuration from YAML
///
/// # Example YAML structure
/// ```yaml
/// security:
///   cors_allowed_origins: "https://example.com,https://app.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent media stream connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_host: "bridge.example.com"

realtime:
  api_key: "sk-yaml"
  voice: "alloy"
  temperature: 0.6

telephony:
  account_sid: "AC123"
  auth_token: "token"
  transfer_webhook_url: "https://bridge.example.com/twiml/transfer"
  lines:
    1: "+13526659393"
    3: "+17185551234"
  dial_timeout_seconds: 20

auth:
  required: true
  api_secrets:
    - id: "dashboard"
      secret: "auth-secret"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.public_host.as_deref(), Some("bridge.example.com"));

        let realtime = config.realtime.as_ref().unwrap();
        assert_eq!(realtime.voice.as_deref(), Some("alloy"));
        assert_eq!(realtime.temperature, Some(0.6));

        let telephony = config.telephony.as_ref().unwrap();
        assert_eq!(telephony.account_sid.as_deref(), Some("AC123"));
        assert_eq!(telephony.lines.len(), 2);
        assert_eq!(telephony.lines[&3], "+17185551234");
        assert_eq!(telephony.dial_timeout_seconds, Some(20));

        let auth = config.auth.as_ref().unwrap();
        assert_eq!(auth.required, Some(true));
        assert_eq!(auth.api_secrets[0].id, "dashboard");
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
server:
  port: 9000
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.server.as_ref().unwrap().host.is_none());
        assert_eq!(config.server.as_ref().unwrap().port, Some(9000));
        assert!(config.realtime.is_none());
        assert!(config.telephony.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();
        assert!(config.server.is_none());
        assert!(config.auth.is_none());
        assert!(config.security.is_none());
    }

    #[test]
    fn test_yaml_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "security:\n  max_connections_per_ip: 5\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.security.unwrap().max_connections_per_ip,
            Some(5)
        );
    }

    #[test]
    fn test_yaml_config_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let err = YamlConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML"));
    }
}
