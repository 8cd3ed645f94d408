//! Realtime model connection.
//!
//! The conversational model is reached over a single WebSocket. The bridge
//! talks to it through a [`ModelLink`] for outbound events and reads parsed
//! [`ServerEvent`]s from a channel.

pub mod base;
pub mod openai;

pub use base::{RealtimeConfig, RealtimeError, RealtimeResult};
pub use openai::{
    ClientEvent, ConversationItem, ModelCommand, ModelConnection, ModelLink, OpenAIRealtime,
    ServerEvent, SessionConfig, ToolDef,
};
