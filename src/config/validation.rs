//! Configuration validation logic.

use std::collections::{BTreeMap, HashSet};

use super::AuthApiSecret;
use super::env::MAX_TRANSFER_LINE;
use crate::core::realtime::openai::OpenAIRealtimeVoice;
use crate::utils::validate_phone_number;

/// REST credentials are only usable as a pair.
pub(crate) fn validate_twilio_credentials(
    account_sid: &Option<String>,
    auth_token: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    match (account_sid, auth_token) {
        (Some(_), None) => Err("TWILIO_ACCOUNT_SID is set but TWILIO_AUTH_TOKEN is missing".into()),
        (None, Some(_)) => Err("TWILIO_AUTH_TOKEN is set but TWILIO_ACCOUNT_SID is missing".into()),
        _ => Ok(()),
    }
}

pub(crate) fn validate_transfer_lines(
    lines: &BTreeMap<u8, String>,
) -> Result<(), Box<dyn std::error::Error>> {
    for (line, number) in lines {
        if !(1..=MAX_TRANSFER_LINE).contains(line) {
            return Err(format!(
                "Transfer line {line} is out of range (1..={MAX_TRANSFER_LINE})"
            )
            .into());
        }
        validate_phone_number(number)
            .map_err(|e| format!("Transfer line {line} has an invalid number: {e}"))?;
    }
    Ok(())
}

pub(crate) fn validate_auth_api_secrets(
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ids = HashSet::new();
    for entry in secrets {
        if entry.id.trim().is_empty() {
            return Err("Auth API secret entries require a non-empty id".into());
        }
        if entry.secret.is_empty() {
            return Err(format!("Auth API secret '{}' is empty", entry.id).into());
        }
        if !ids.insert(entry.id.as_str()) {
            return Err(format!("Duplicate auth API secret id '{}'", entry.id).into());
        }
    }
    Ok(())
}

/// Admin endpoints cannot require auth without any way to authenticate.
pub(crate) fn validate_auth_required(
    auth_required: bool,
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    if auth_required && secrets.is_empty() {
        return Err(
            "AUTH_REQUIRED is enabled but no API secret is configured (AUTH_API_SECRET or AUTH_API_SECRETS_JSON)"
                .into(),
        );
    }
    Ok(())
}

pub(crate) fn validate_temperature(temperature: f32) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(format!("TEMPERATURE must be between 0.0 and 2.0, got {temperature}").into());
    }
    Ok(())
}

pub(crate) fn validate_voice(voice: &str) -> Result<(), Box<dyn std::error::Error>> {
    if OpenAIRealtimeVoice::parse(voice).is_none() {
        let known: Vec<&str> = OpenAIRealtimeVoice::all().iter().map(|v| v.as_str()).collect();
        return Err(format!("Unknown VOICE '{voice}', expected one of: {}", known.join(", ")).into());
    }
    Ok(())
}
