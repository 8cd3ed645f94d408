//! Telephony platform webhooks
//!
//! - `/incoming-call` answers a new call with TwiML that opens the media stream
//! - `/twiml/transfer` answers a redirected call with the `<Dial>` document
//! - `/twilio/number-status` and `/twilio/dial-action` feed the Transfer Registry
//!
//! The platform sends form-encoded bodies and sometimes query parameters, so
//! every handler reads both through [`WebhookParams`].

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::transfer::{DEFAULT_DIAL_TIMEOUT_SECS, TransferStatus, TransferTwiml};
use crate::core::bridge::{CALL_SID_PARAM, CALLER_PHONE_PARAM};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::{clean_e164, empty_twiml_response, escape_xml, validate_phone_number};
use crate::utils::xml::XML_PROLOG;

const TWIML_CONTENT_TYPE: &str = "text/xml";

/// Query string and form body of one webhook request
#[derive(Debug, Default)]
pub struct WebhookParams {
    query: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl WebhookParams {
    pub fn parse(query: Option<&str>, body: &[u8]) -> Self {
        let decode = |bytes: &[u8]| {
            url::form_urlencoded::parse(bytes)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            query: query.map(|q| decode(q.as_bytes())).unwrap_or_default(),
            form: decode(body),
        }
    }

    /// Non-empty form field
    pub fn form(&self, key: &str) -> Option<&str> {
        non_empty(self.form.get(key))
    }

    /// Non-empty query parameter
    pub fn query(&self, key: &str) -> Option<&str> {
        non_empty(self.query.get(key))
    }

    /// Call id for dial callbacks: `?call_sid=` first, then the form's `CallSid`.
    pub fn callback_call_sid(&self) -> Option<&str> {
        self.query("call_sid").or_else(|| self.form("CallSid"))
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn twiml(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

// =============================================================================
// Incoming call
// =============================================================================

/// Answer an incoming call by connecting it to `/media-stream`
///
/// The caller's number (`From`) and the call id (`CallSid`) ride along as
/// stream parameters, which is the only trusted path for the caller identity
/// into the media stream.
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> AppResult<Response> {
    let params = WebhookParams::parse(query.as_deref(), &body);

    let host = state
        .config
        .public_host
        .clone()
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| AppError::BadRequest("Cannot determine the public host".to_string()))?;

    let caller_phone = params
        .form("From")
        .or_else(|| params.query("From"))
        .unwrap_or_default();
    let call_sid = params.form("CallSid").or_else(|| params.query("CallSid"));

    info!(caller_phone = %caller_phone, call_sid = ?call_sid, "Incoming call");

    Ok(twiml(connect_stream_twiml(&host, caller_phone, call_sid)))
}

fn connect_stream_twiml(host: &str, caller_phone: &str, call_sid: Option<&str>) -> String {
    let stream_url = format!("wss://{}/media-stream", host.trim_end_matches('/'));
    let mut twiml = format!(
        r#"{XML_PROLOG}<Response><Pause length="1"/><Connect><Stream url="{}">"#,
        escape_xml(&stream_url)
    );
    twiml.push_str(&format!(
        r#"<Parameter name="{CALLER_PHONE_PARAM}" value="{}"/>"#,
        escape_xml(caller_phone)
    ));
    if let Some(call_sid) = call_sid {
        twiml.push_str(&format!(
            r#"<Parameter name="{CALL_SID_PARAM}" value="{}"/>"#,
            escape_xml(call_sid)
        ));
    }
    twiml.push_str("</Stream></Connect></Response>");
    twiml
}

// =============================================================================
// Transfer
// =============================================================================

/// TwiML for a call redirected by the call-control client
///
/// `?target_number` names the destination; without one the first configured
/// transfer line is dialed. The transfer record is (re)marked `pending`.
pub async fn transfer_twiml(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> AppResult<Response> {
    let params = WebhookParams::parse(query.as_deref(), &body);

    let call_sid = params
        .form("CallSid")
        .or_else(|| params.query("CallSid"))
        .unwrap_or_default();

    let destination = match params.query("target_number") {
        Some(target) => clean_e164(target),
        None => state
            .config
            .transfer_lines
            .values()
            .next()
            .cloned()
            .ok_or_else(|| AppError::BadRequest("target_number is required".to_string()))?,
    };
    let destination = validate_phone_number(&destination)
        .map_err(|e| AppError::BadRequest(format!("Invalid target_number: {e}")))?;

    let callback_base = state.config.callback_base().ok_or_else(|| {
        AppError::ServiceUnavailable("Transfer callback base is not configured".to_string())
    })?;

    if !call_sid.is_empty() {
        state.transfer_registry.set_pending(call_sid, &destination);
    }
    info!(call_sid = %call_sid, destination = %destination, "Serving transfer TwiML");

    let caller_id = state.config.twilio_caller_id.as_deref().map(clean_e164);
    let dial_timeout_secs =
        u32::try_from(state.config.dial_timeout_seconds).unwrap_or(DEFAULT_DIAL_TIMEOUT_SECS);

    let document = TransferTwiml {
        call_sid,
        destination: &destination,
        callback_base: &callback_base,
        caller_id: caller_id.as_deref(),
        dial_timeout_secs,
    }
    .render();

    Ok(twiml(document))
}

/// Per-leg status callback for the transfer's dialed number
pub async fn number_status(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> StatusCode {
    let params = WebhookParams::parse(query.as_deref(), &body);
    let Some(call_sid) = params.callback_call_sid() else {
        warn!("Number status callback without a call id");
        return StatusCode::OK;
    };

    let reported = params
        .form("CallStatus")
        .or_else(|| params.form("DialCallStatus"))
        .or_else(|| params.form("CallEvent"))
        .unwrap_or("in-progress");

    match TransferStatus::parse(reported) {
        Some(status) => {
            let known = state.transfer_registry.set_status(call_sid, status);
            debug!(call_sid = %call_sid, status = %status, known, "Transfer leg status");
        }
        None => warn!(call_sid = %call_sid, status = %reported, "Unrecognized transfer status"),
    }

    StatusCode::OK
}

/// Final outcome of the `<Dial>` verb
pub async fn dial_action(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let params = WebhookParams::parse(query.as_deref(), &body);

    if let (Some(call_sid), Some(reported)) =
        (params.callback_call_sid(), params.form("DialCallStatus"))
    {
        match TransferStatus::parse(reported) {
            Some(status) => {
                state.transfer_registry.set_status(call_sid, status);
                info!(call_sid = %call_sid, status = %status, "Transfer dial finished");
            }
            None => warn!(call_sid = %call_sid, status = %reported, "Unrecognized dial status"),
        }
    }

    twiml(empty_twiml_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_params_prefers_query_call_sid() {
        let params = WebhookParams::parse(Some("call_sid=CA1"), b"CallSid=CA2&CallStatus=busy");
        assert_eq!(params.callback_call_sid(), Some("CA1"));
        assert_eq!(params.form("CallStatus"), Some("busy"));

        let params = WebhookParams::parse(None, b"CallSid=CA2");
        assert_eq!(params.callback_call_sid(), Some("CA2"));
    }

    #[test]
    fn test_webhook_params_ignores_blank_values() {
        let params = WebhookParams::parse(Some("call_sid="), b"CallSid=+&From=%2B14155550001");
        assert_eq!(params.callback_call_sid(), None);
        assert_eq!(params.form("From"), Some("+14155550001"));
    }

    #[test]
    fn test_connect_stream_twiml() {
        let twiml = connect_stream_twiml("bridge.example.com", "+14155550001", Some("CA1"));
        assert!(twiml.starts_with(XML_PROLOG));
        assert!(twiml.contains(r#"<Stream url="wss://bridge.example.com/media-stream">"#));
        assert!(twiml.contains(r#"<Parameter name="caller_phone" value="+14155550001"/>"#));
        assert!(twiml.contains(r#"<Parameter name="call_sid" value="CA1"/>"#));
    }

    #[test]
    fn test_connect_stream_twiml_escapes_and_omits_missing_sid() {
        let twiml = connect_stream_twiml("bridge.example.com", "<anon>", None);
        assert!(twiml.contains(r#"value="&lt;anon&gt;""#));
        assert!(!twiml.contains("call_sid"));
    }
}
