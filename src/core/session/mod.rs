//! Session initializer: the configuration handshake sent to the model.

pub mod setup;
pub mod tools;

pub use setup::{
    DEFAULT_GREETING_PROMPT, caller_metadata_update, greeting_item, initialize_session,
    session_update,
};
pub use tools::{Tool, tool_definitions};
