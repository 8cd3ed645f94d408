//! Environment variable loading.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use super::{AuthApiSecret, ServerConfig, TlsConfig, parse_auth_api_secrets_json};
use crate::utils::clean_e164;

/// Highest configurable transfer line.
pub(crate) const MAX_TRANSFER_LINE: u8 = 3;

/// Read a variable, treating empty values as unset.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {key} value '{raw}': {e}").into()),
        None => Ok(None),
    }
}

fn parse_bool(key: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match env_var(key).map(|v| v.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(format!("Invalid {key} value '{v}': expected true or false").into()),
        None => Ok(None),
    }
}

pub(crate) fn read_instructions_file(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read instructions file {path}: {e}"))?;
    Ok(contents.trim().to_string())
}

/// Build a configuration from defaults plus environment variables.
pub(crate) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_env::<u16>("PORT")? {
        config.port = port;
    }
    config.public_host = env_var("PUBLIC_HOST");

    match (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => {
            config.tls = Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            })
        }
        (None, None) => {}
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    }

    // Realtime model
    config.openai_api_key = env_var("OPENAI_API_KEY");
    if let Some(model) = env_var("REALTIME_MODEL") {
        config.realtime_model = model;
    }
    if let Some(voice) = env_var("VOICE") {
        config.voice = voice;
    }
    if let Some(temperature) = parse_env::<f32>("TEMPERATURE")? {
        config.temperature = temperature;
    }
    if let Some(path) = env_var("INSTRUCTIONS_PATH") {
        config.instructions = read_instructions_file(&path)?;
    } else if let Some(instructions) = env_var("INSTRUCTIONS") {
        config.instructions = instructions;
    }
    config.greeting_prompt = env_var("GREETING_PROMPT");

    // Telephony
    config.twilio_account_sid = env_var("TWILIO_ACCOUNT_SID");
    config.twilio_auth_token = env_var("TWILIO_AUTH_TOKEN");
    config.transfer_webhook_url = env_var("TRANSFER_WEBHOOK_URL");
    config.twilio_callback_base = env_var("TWILIO_CALLBACK_BASE");
    config.twilio_caller_id = env_var("TWILIO_CALLER_ID");
    if let Some(base) = env_var("TWILIO_API_BASE") {
        config.twilio_api_base = base;
    }
    config.transfer_lines = transfer_lines_from_env();
    if let Some(timeout) = parse_env::<u64>("TRANSFER_TIMEOUT_SECONDS")? {
        config.transfer_timeout_seconds = timeout;
    }
    if let Some(timeout) = parse_env::<u64>("DIAL_TIMEOUT_SECONDS")? {
        config.dial_timeout_seconds = timeout;
    }

    // Authentication
    if let Some(required) = parse_bool("AUTH_REQUIRED")? {
        config.auth_required = required;
    }
    config.auth_api_secrets = auth_secrets_from_env()?;

    // Security
    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    if let Some(rps) = parse_env::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = parse_env::<u32>("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = parse_env::<usize>("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(per_ip) = parse_env::<u32>("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = per_ip;
    }

    Ok(config)
}

fn transfer_lines_from_env() -> BTreeMap<u8, String> {
    (1..=MAX_TRANSFER_LINE)
        .filter_map(|line| {
            env_var(&format!("TRANSFER_LINE_{line}")).map(|number| (line, clean_e164(&number)))
        })
        .collect()
}

/// `AUTH_API_SECRETS_JSON` wins over the single `AUTH_API_SECRET` form.
fn auth_secrets_from_env() -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    if let Some(json) = env_var("AUTH_API_SECRETS_JSON") {
        return parse_auth_api_secrets_json(&json);
    }
    Ok(env_var("AUTH_API_SECRET")
        .map(|secret| {
            vec![AuthApiSecret {
                id: env_var("AUTH_API_SECRET_ID").unwrap_or_else(|| "default".to_string()),
                secret,
            }]
        })
        .unwrap_or_default())
}
