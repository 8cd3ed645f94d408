//! OpenAI Realtime API constants and voice selection.

use serde::{Deserialize, Serialize};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Default output voice.
pub const DEFAULT_REALTIME_VOICE: &str = "marin";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// G.711 u-law at 8kHz, the telephony media stream encoding. Used for both
/// directions so audio is relayed without transcoding.
pub const AUDIO_FORMAT_PCMU: &str = "audio/pcmu";

// =============================================================================
// Voices
// =============================================================================

/// Voices accepted by the OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    Alloy,
    Ash,
    Ballad,
    Cedar,
    Coral,
    Echo,
    #[default]
    Marin,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Cedar => "cedar",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Marin => "marin",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse a voice name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Get all available voices.
    pub fn all() -> &'static [OpenAIRealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Cedar,
            Self::Coral,
            Self::Echo,
            Self::Marin,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parse() {
        assert_eq!(OpenAIRealtimeVoice::parse("marin"), Some(OpenAIRealtimeVoice::Marin));
        assert_eq!(OpenAIRealtimeVoice::parse(" Cedar "), Some(OpenAIRealtimeVoice::Cedar));
        assert_eq!(OpenAIRealtimeVoice::parse("nova"), None);
    }

    #[test]
    fn test_default_voice_matches_constant() {
        assert_eq!(OpenAIRealtimeVoice::default().as_str(), DEFAULT_REALTIME_VOICE);
    }
}
