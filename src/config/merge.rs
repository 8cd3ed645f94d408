//! Merging YAML overrides onto the environment configuration.

use std::path::PathBuf;

use super::env::{load_from_env, read_instructions_file};
use super::yaml::YamlConfig;
use super::{AuthApiSecret, ServerConfig, TlsConfig};
use crate::utils::clean_e164;

/// Environment first, then every value the YAML file sets.
pub(crate) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if server.public_host.is_some() {
            config.public_host = server.public_host;
        }
        if let Some(tls) = server.tls {
            match (tls.enabled, tls.cert_path, tls.key_path) {
                (Some(false), _, _) => config.tls = None,
                (_, Some(cert), Some(key)) => {
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert),
                        key_path: PathBuf::from(key),
                    })
                }
                (Some(true), _, _) => {
                    return Err("server.tls requires both cert_path and key_path".into());
                }
                _ => {}
            }
        }
    }

    if let Some(realtime) = yaml.realtime {
        if realtime.api_key.is_some() {
            config.openai_api_key = realtime.api_key;
        }
        if let Some(model) = realtime.model {
            config.realtime_model = model;
        }
        if let Some(voice) = realtime.voice {
            config.voice = voice;
        }
        if let Some(temperature) = realtime.temperature {
            config.temperature = temperature;
        }
        if let Some(path) = realtime.instructions_path {
            config.instructions = read_instructions_file(&path)?;
        } else if let Some(instructions) = realtime.instructions {
            config.instructions = instructions;
        }
        if realtime.greeting_prompt.is_some() {
            config.greeting_prompt = realtime.greeting_prompt;
        }
    }

    if let Some(telephony) = yaml.telephony {
        if telephony.account_sid.is_some() {
            config.twilio_account_sid = telephony.account_sid;
        }
        if telephony.auth_token.is_some() {
            config.twilio_auth_token = telephony.auth_token;
        }
        if telephony.transfer_webhook_url.is_some() {
            config.transfer_webhook_url = telephony.transfer_webhook_url;
        }
        if telephony.callback_base.is_some() {
            config.twilio_callback_base = telephony.callback_base;
        }
        if telephony.caller_id.is_some() {
            config.twilio_caller_id = telephony.caller_id;
        }
        if let Some(base) = telephony.api_base {
            config.twilio_api_base = base;
        }
        for (line, number) in telephony.lines {
            config.transfer_lines.insert(line, clean_e164(&number));
        }
        if let Some(timeout) = telephony.transfer_timeout_seconds {
            config.transfer_timeout_seconds = timeout;
        }
        if let Some(timeout) = telephony.dial_timeout_seconds {
            config.dial_timeout_seconds = timeout;
        }
    }

    if let Some(auth) = yaml.auth {
        if let Some(required) = auth.required {
            config.auth_required = required;
        }
        if !auth.api_secrets.is_empty() {
            config.auth_api_secrets = auth
                .api_secrets
                .into_iter()
                .map(|entry| AuthApiSecret {
                    id: entry.id,
                    secret: entry.secret,
                })
                .collect();
        } else if let Some(secret) = auth.api_secret {
            config.auth_api_secrets = vec![AuthApiSecret {
                id: "default".to_string(),
                secret,
            }];
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(per_ip) = security.max_connections_per_ip {
            config.max_connections_per_ip = per_ip;
        }
    }

    Ok(config)
}
