//! Live transfer to a human: registry, statuses, call control and the
//! TwiML served for the redirected leg.

pub mod call_control;
pub mod registry;
pub mod status;
pub mod twiml;

pub use call_control::{
    CallControl, TWILIO_API_BASE, TransferError, TwilioCallControl, TwilioCallControlConfig,
};
pub use registry::{TRANSFER_POLL_INTERVAL, TRANSFER_TIMEOUT, TransferRecord, TransferRegistry};
pub use status::TransferStatus;
pub use twiml::{DEFAULT_DIAL_TIMEOUT_SECS, NUMBER_STATUS_EVENTS, TransferTwiml};
