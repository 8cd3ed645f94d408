//! OpenAI Realtime API module.
//!
//! Bidirectional audio streaming with server-side turn detection and function
//! calling, configured for telephony audio (G.711 u-law in both directions).

mod client;
mod config;
mod messages;

pub use client::{ModelCommand, ModelConnection, ModelLink, OpenAIRealtime};
pub use config::{
    AUDIO_FORMAT_PCMU, DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE, DEFAULT_TEMPERATURE,
    OPENAI_REALTIME_URL, OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, AudioConfig, AudioFormat, AudioInputConfig, AudioOutputConfig, ClientEvent,
    ContentPart, ConversationItem, OutputItem, ServerEvent, SessionConfig, ToolDef,
    TurnDetection,
};
