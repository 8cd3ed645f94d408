//! One-time session configuration sent when the model connection opens.

use serde_json::json;

use super::tools::tool_definitions;
use crate::core::realtime::openai::{
    AudioConfig, AudioFormat, AudioInputConfig, AudioOutputConfig, TurnDetection,
};
use crate::core::realtime::{
    ClientEvent, ConversationItem, ModelLink, RealtimeConfig, RealtimeResult, SessionConfig,
};

/// Server VAD activation threshold.
pub const VAD_THRESHOLD: f32 = 0.7;
pub const VAD_PREFIX_PADDING_MS: u32 = 300;
pub const VAD_SILENCE_DURATION_MS: u32 = 500;

/// Greeting prompt used when none is configured.
pub const DEFAULT_GREETING_PROMPT: &str = "Start the conversation with your initial greeting.";

/// Build the `session.update` that configures audio, voice, turn detection,
/// instructions and tools.
pub fn session_update(config: &RealtimeConfig) -> ClientEvent {
    let mut session = SessionConfig::realtime();
    session.model = Some(config.model.clone());
    session.output_modalities = Some(vec!["audio".to_string()]);
    session.audio = Some(AudioConfig {
        input: Some(AudioInputConfig {
            format: AudioFormat::pcmu(),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: Some(VAD_THRESHOLD),
                prefix_padding_ms: Some(VAD_PREFIX_PADDING_MS),
                silence_duration_ms: Some(VAD_SILENCE_DURATION_MS),
            }),
        }),
        output: Some(AudioOutputConfig {
            format: AudioFormat::pcmu(),
            voice: Some(config.voice.clone()),
        }),
    });
    if !config.instructions.is_empty() {
        session.instructions = Some(config.instructions.clone());
    }
    session.tools = Some(tool_definitions());
    session.tool_choice = Some("auto".to_string());

    ClientEvent::SessionUpdate { session }
}

/// The synthetic user message that makes the assistant speak first.
pub fn greeting_item(config: &RealtimeConfig) -> ClientEvent {
    let prompt = config
        .greeting_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_GREETING_PROMPT);
    ClientEvent::ConversationItemCreate {
        item: ConversationItem::user_text(prompt),
    }
}

/// Caller identity attached to the session once the media stream starts.
pub fn caller_metadata_update(
    caller_phone: Option<&str>,
    call_sid: Option<&str>,
    stream_sid: &str,
) -> ClientEvent {
    let mut session = SessionConfig::realtime();
    session.metadata = Some(json!({
        "caller_phone": caller_phone,
        "call_sid": call_sid,
        "stream_sid": stream_sid,
    }));
    ClientEvent::SessionUpdate { session }
}

/// Configure the session, then start the conversation with the greeting.
pub async fn initialize_session(link: &ModelLink, config: &RealtimeConfig) -> RealtimeResult<()> {
    tracing::debug!(model = %config.model, voice = %config.voice, "Sending session update");
    link.send(session_update(config)).await?;
    link.send(greeting_item(config)).await?;
    link.send(ClientEvent::ResponseCreate).await?;
    Ok(())
}
