pub mod bridge;
pub mod realtime;
pub mod records;
pub mod session;
pub mod transfer;

pub use bridge::{BridgeError, BridgeSession, ToolContext};
pub use realtime::{OpenAIRealtime, RealtimeConfig, RealtimeError, RealtimeResult};
pub use records::{CallRecordStore, InMemoryCallRecordStore};
pub use transfer::{CallControl, TransferRegistry, TransferStatus, TwilioCallControl};
