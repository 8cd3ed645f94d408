//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `admin` - Call records and transfer lookups
//! - `media_stream` - Telephony media stream WebSocket
//! - `twilio` - Telephony webhooks (incoming call, transfer TwiML, dial callbacks)

pub mod admin;
pub mod api;
pub mod media_stream;
pub mod twilio;

pub use media_stream::media_stream_handler;
