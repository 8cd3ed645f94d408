//! Bridge between the caller's media stream and the realtime model.

mod caller;
mod dispatcher;
mod error;
mod interruption;
mod session;
mod state;

pub use caller::{
    CallerInbound, CallerLink, CallerOutbound, MARK_NAME, MediaPayload, OutboundMark,
    OutboundMedia, StartPayload,
};
pub use dispatcher::{
    BUSY_LINE, PENDING_TIMEOUT, PendingTransfer, ToolContext, ToolDispatcher, TransferOutcome,
};
pub use error::BridgeError;
pub use interruption::{
    INTERRUPTION_DEBOUNCE_MS, INTERRUPTION_MIN_SPEAKING_MS, InterruptionTiming, evaluate,
    handle_interruption,
};
pub use session::{BridgeSession, CALL_SID_PARAM, CALLER_PHONE_PARAM};
pub use state::{CallIdentity, CallState};
