//! Caller transport messages (telephony media stream).
//!
//! Inbound messages are JSON objects tagged by `event`. Outbound audio,
//! marks and clears are queued on a [`CallerLink`]; the WebSocket handler
//! drains the queue into the socket.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;

use super::error::BridgeError;

/// Name carried by every outbound mark.
pub const MARK_NAME: &str = "part";

// =============================================================================
// Inbound
// =============================================================================

/// Message received from the caller transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallerInbound {
    Connected,
    Start { start: StartPayload },
    Media { media: MediaPayload },
    Mark,
    Stop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    /// `<Parameter>` values set by the call origination webhook
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Stream-clock milliseconds
    #[serde(default, deserialize_with = "de_timestamp")]
    pub timestamp: u64,
    /// Base64 audio
    pub payload: String,
}

/// The platform sends the timestamp as a decimal string; numbers are accepted too.
fn de_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Message sent to the caller transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallerOutbound {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl CallerOutbound {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    pub fn mark(stream_sid: &str) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_string(),
            mark: OutboundMark {
                name: MARK_NAME.to_string(),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

/// Sending half of the caller transport.
#[derive(Clone, Debug)]
pub struct CallerLink {
    tx: mpsc::Sender<CallerOutbound>,
}

impl CallerLink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CallerOutbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a message; fails once the transport writer has gone away.
    pub async fn send(&self, message: CallerOutbound) -> Result<(), BridgeError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BridgeError::CallerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_parse_start() {
        let msg: CallerInbound = serde_json::from_value(json!({
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ1",
                "callSid": "CA1",
                "accountSid": "AC1",
                "tracks": ["inbound"],
                "customParameters": {"caller_phone": "+14155550001", "call_sid": "CA1"}
            },
            "streamSid": "MZ1"
        }))
        .unwrap();

        match msg {
            CallerInbound::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid.as_deref(), Some("CA1"));
                assert_eq!(start.custom_parameters["caller_phone"], "+14155550001");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_string_and_number_timestamp() {
        for timestamp in [json!("1234"), json!(1234)] {
            let msg: CallerInbound = serde_json::from_value(json!({
                "event": "media",
                "media": {"track": "inbound", "chunk": "2", "timestamp": timestamp, "payload": "AAAA"},
                "streamSid": "MZ1"
            }))
            .unwrap();
            match msg {
                CallerInbound::Media { media } => {
                    assert_eq!(media.timestamp, 1234);
                    assert_eq!(media.payload, "AAAA");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_mark_stop_and_unknown() {
        let mark: CallerInbound =
            serde_json::from_str(r#"{"event":"mark","streamSid":"MZ1","mark":{"name":"part"}}"#)
                .unwrap();
        assert!(matches!(mark, CallerInbound::Mark));

        let stop: CallerInbound = serde_json::from_str(r#"{"event":"stop","stop":{}}"#).unwrap();
        assert!(matches!(stop, CallerInbound::Stop));

        let dtmf: CallerInbound =
            serde_json::from_str(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap();
        assert!(matches!(dtmf, CallerInbound::Other));
    }

    #[test]
    fn test_outbound_shapes() {
        let media: Value =
            serde_json::to_value(CallerOutbound::media("MZ1", "AAAA".to_string())).unwrap();
        assert_eq!(
            media,
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "AAAA"}})
        );

        let mark: Value = serde_json::to_value(CallerOutbound::mark("MZ1")).unwrap();
        assert_eq!(
            mark,
            json!({"event": "mark", "streamSid": "MZ1", "mark": {"name": "part"}})
        );

        let clear: Value = serde_json::to_value(CallerOutbound::clear("MZ1")).unwrap();
        assert_eq!(clear, json!({"event": "clear", "streamSid": "MZ1"}));
    }

    #[tokio::test]
    async fn test_link_send_fails_after_writer_gone() {
        let (link, rx) = CallerLink::channel(1);
        drop(rx);
        assert!(matches!(
            link.send(CallerOutbound::clear("MZ1")).await,
            Err(BridgeError::CallerClosed)
        ));
    }
}
