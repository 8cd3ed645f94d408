//! TwiML document served to the platform when a call is redirected for transfer.

use crate::utils::xml::{XML_PROLOG, escape_xml};

/// Per-leg events reported back on the number status callback.
pub const NUMBER_STATUS_EVENTS: &str = "initiated ringing answered completed busy no-answer failed";

/// Default ring time for the human destination, in seconds.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u32 = 25;

/// Parameters for the `<Dial>` document.
#[derive(Debug, Clone)]
pub struct TransferTwiml<'a> {
    pub call_sid: &'a str,
    pub destination: &'a str,
    /// Public base URL the platform uses to reach the callback endpoints.
    pub callback_base: &'a str,
    pub caller_id: Option<&'a str>,
    pub dial_timeout_secs: u32,
}

impl TransferTwiml<'_> {
    /// Render the `<Dial><Number>` document.
    ///
    /// The dial `action` reports the final outcome to `/twilio/dial-action` and
    /// the number's `statusCallback` reports each leg event to
    /// `/twilio/number-status`, both keyed by `call_sid`.
    pub fn render(&self) -> String {
        let base = self.callback_base.trim_end_matches('/');
        let action = format!("{base}/twilio/dial-action?call_sid={}", self.call_sid);
        let status_callback = format!("{base}/twilio/number-status?call_sid={}", self.call_sid);

        let caller_id = self
            .caller_id
            .filter(|id| !id.is_empty())
            .map(|id| format!(r#" callerId="{}""#, escape_xml(id)))
            .unwrap_or_default();

        format!(
            concat!(
                "{prolog}<Response>",
                r#"<Dial answerOnBridge="true" timeout="{timeout}"{caller_id} action="{action}" method="POST">"#,
                r#"<Number statusCallback="{status_callback}" statusCallbackEvent="{events}" statusCallbackMethod="POST">{destination}</Number>"#,
                "</Dial></Response>"
            ),
            prolog = XML_PROLOG,
            timeout = self.dial_timeout_secs,
            caller_id = caller_id,
            action = escape_xml(&action),
            status_callback = escape_xml(&status_callback),
            events = NUMBER_STATUS_EVENTS,
            destination = escape_xml(self.destination),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_caller_id() {
        let twiml = TransferTwiml {
            call_sid: "CA123",
            destination: "+14155550001",
            callback_base: "https://bridge.example.com/",
            caller_id: Some("+14155559999"),
            dial_timeout_secs: DEFAULT_DIAL_TIMEOUT_SECS,
        }
        .render();

        assert!(twiml.starts_with(XML_PROLOG));
        assert!(twiml.contains(r#"answerOnBridge="true""#));
        assert!(twiml.contains(r#"timeout="25""#));
        assert!(twiml.contains(r#"callerId="+14155559999""#));
        assert!(twiml.contains(
            r#"action="https://bridge.example.com/twilio/dial-action?call_sid=CA123""#
        ));
        assert!(twiml.contains(
            r#"statusCallback="https://bridge.example.com/twilio/number-status?call_sid=CA123""#
        ));
        assert!(twiml.contains(&format!(r#"statusCallbackEvent="{NUMBER_STATUS_EVENTS}""#)));
        assert!(twiml.contains(">+14155550001</Number></Dial></Response>"));
    }

    #[test]
    fn test_render_without_caller_id() {
        let twiml = TransferTwiml {
            call_sid: "CA123",
            destination: "+14155550001",
            callback_base: "https://bridge.example.com",
            caller_id: None,
            dial_timeout_secs: 30,
        }
        .render();

        assert!(!twiml.contains("callerId"));
        assert!(twiml.contains(r#"timeout="30""#));
    }
}
