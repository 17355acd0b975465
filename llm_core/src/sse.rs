//! Server-sent event framing for streamed chat completions.

use serde::Deserialize;

use crate::LlmError;

/// Reassembles `data:` lines from arbitrarily split network chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes, returning the payload of every complete `data:` line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// One decoded `data:` payload.
#[derive(Debug, PartialEq)]
pub enum ChatEvent {
    Delta(String),
    /// Role-only, finish-reason or otherwise empty chunk.
    Empty,
    Done,
}

impl ChatEvent {
    pub fn parse(data: &str) -> Result<Self, LlmError> {
        if data == "[DONE]" {
            return Ok(ChatEvent::Done);
        }

        let chunk: ChatChunk =
            serde_json::from_str(data).map_err(|e| LlmError::Parse(format!("{e}: {data}")))?;

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(ChatEvent::Delta)
            .unwrap_or(ChatEvent::Empty))
    }
}
