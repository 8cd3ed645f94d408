use thiserror::Error;

use crate::core::realtime::RealtimeError;

/// Errors that end a bridge session.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The caller transport is gone; a normal end of the call.
    #[error("caller transport closed")]
    CallerClosed,

    /// The trusted caller number is missing or malformed when a record has
    /// to be written. Fatal for the call: no placeholder is ever stored.
    #[error("caller identity unavailable: {0}")]
    IdentityIntegrity(String),

    #[error("model connection error: {0}")]
    Realtime(#[from] RealtimeError),
}
