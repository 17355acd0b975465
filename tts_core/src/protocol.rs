//! Wire format of the input-streaming synthesis websocket.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
        }
    }
}

/// Client to server messages.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ClientMessage<'a> {
    /// First message on a fresh connection. The text is a single space.
    Init {
        text: &'static str,
        voice_settings: VoiceSettings,
        xi_api_key: &'a str,
    },
    Chunk {
        text: &'a str,
        try_trigger_generation: bool,
    },
    /// Empty text tells the server no more input will follow.
    End { text: &'static str },
}

impl<'a> ClientMessage<'a> {
    pub fn init(voice_settings: VoiceSettings, api_key: &'a str) -> Self {
        ClientMessage::Init {
            text: " ",
            voice_settings,
            xi_api_key: api_key,
        }
    }

    pub fn chunk(text: &'a str) -> Self {
        ClientMessage::Chunk {
            text,
            try_trigger_generation: true,
        }
    }

    pub fn end() -> Self {
        ClientMessage::End { text: "" }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings, floats and bools cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawServerMessage {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default, rename = "isFinal")]
    is_final: Option<bool>,
}

/// Server to client messages, after decoding.
#[derive(Debug, PartialEq)]
pub enum ServerMessage {
    Audio(Vec<u8>),
    Final,
    /// Anything else the server sends (alignment data, `audio: null`, ...).
    Other,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let raw: RawServerMessage = serde_json::from_str(text).map_err(SessionError::protocol)?;

        match raw.audio.as_deref() {
            Some(audio) if !audio.is_empty() => {
                let bytes = general_purpose::STANDARD
                    .decode(audio)
                    .map_err(|e| SessionError::protocol(format!("invalid audio payload: {e}")))?;
                Ok(ServerMessage::Audio(bytes))
            }
            _ if raw.is_final == Some(true) => Ok(ServerMessage::Final),
            _ => Ok(ServerMessage::Other),
        }
    }
}
