// Configuration loaded from the environment (and `.env`)

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use llm_core::ChatConfig;
use tts_core::{AudioFormat, SynthesisConfig, VoiceSettings};

pub const DEFAULT_VOICE_ID: &str = "oWAxZDx7w5VEj9dCyTzz";
pub const DEFAULT_DEEPGRAM_URL: &str = "wss://api.deepgram.com";

#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
}

#[derive(Clone)]
pub struct AgentConfig {
    pub voice_id: String,
    pub synthesis: SynthesisConfig,
    pub audio_format: AudioFormat,
    pub openai_api_key: String,
    pub chat: ChatConfig,
    /// `None` disables the microphone transcript source.
    pub deepgram: Option<DeepgramConfig>,
    pub output_device: Option<String>,
    pub queue_capacity: usize,
    /// `None` disables the HTTP control surface.
    pub control_port: Option<u16>,
    pub request_timeout_secs: u64,
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(elevenlabs_key) = var("ELEVENLABS_API_KEY") else {
            bail!("ELEVENLABS_API_KEY is not set");
        };
        let Some(openai_api_key) = var("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY is not set");
        };

        let synthesis_defaults = SynthesisConfig::default();
        let voice_defaults = VoiceSettings::default();
        let synthesis = SynthesisConfig {
            base_url: var("ELEVENLABS_BASE_URL").unwrap_or(synthesis_defaults.base_url),
            model_id: var("ELEVENLABS_MODEL_ID").unwrap_or(synthesis_defaults.model_id),
            api_key: elevenlabs_key,
            voice_settings: VoiceSettings {
                stability: parse_var(var("TTS_STABILITY")).unwrap_or(voice_defaults.stability),
                similarity_boost: parse_var(var("TTS_SIMILARITY_BOOST"))
                    .unwrap_or(voice_defaults.similarity_boost),
            },
        };

        let chat_defaults = ChatConfig::default();
        let chat = ChatConfig {
            base_url: var("LLM_BASE_URL").unwrap_or(chat_defaults.base_url),
            model: var("LLM_MODEL").unwrap_or(chat_defaults.model),
            temperature: parse_var(var("LLM_TEMPERATURE")).unwrap_or(chat_defaults.temperature),
            max_tokens: parse_var(var("LLM_MAX_TOKENS")).unwrap_or(chat_defaults.max_tokens),
        };

        let deepgram = var("DEEPGRAM_API_KEY").map(|api_key| DeepgramConfig {
            api_key,
            base_url: var("DEEPGRAM_BASE_URL").unwrap_or_else(|| DEFAULT_DEEPGRAM_URL.to_string()),
            model: var("DEEPGRAM_MODEL").unwrap_or_else(|| "nova-2".to_string()),
            language: var("DEEPGRAM_LANGUAGE").unwrap_or_else(|| "en-US".to_string()),
        });

        Ok(Self {
            voice_id: var("ELEVENLABS_VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            synthesis,
            audio_format: parse_var(var("TTS_AUDIO_FORMAT")).unwrap_or_default(),
            openai_api_key,
            chat,
            deepgram,
            output_device: var("AUDIO_OUTPUT_DEVICE"),
            queue_capacity: parse_var(var("PIPELINE_QUEUE_CAPACITY"))
                .filter(|n: &usize| *n > 0)
                .unwrap_or(8),
            control_port: parse_var(var("CONTROL_PORT")),
            request_timeout_secs: parse_var(var("REQUEST_TIMEOUT_SECS")).unwrap_or(30),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
