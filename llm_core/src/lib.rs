mod sse;

use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use sse::{ChatEvent, SseDecoder};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparsable stream event: {0}")]
    Parse(String),
}

/// Incremental text deltas, in generation order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Anything that turns a prompt into a stream of text deltas.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn stream(&self, prompt: &str) -> Result<TokenStream, LlmError>;
}

/// Structure for the OpenAI Chat API request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u16,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u16,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            max_tokens: 15,
        }
    }
}

pub struct OpenAiClient {
    api_key: String,
    client: Client,
    config: ChatConfig,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, config: ChatConfig) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TokenSource for OpenAiClient {
    /// Starts a streamed chat completion for a single user message.
    async fn stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        let req_body = ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        debug!("Requesting streamed completion from {}", self.config.model);
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&req_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let tokens = stream! {
            let mut decoder = SseDecoder::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::Request(e));
                        break;
                    }
                };
                for data in decoder.push(&chunk) {
                    match ChatEvent::parse(&data) {
                        Ok(ChatEvent::Delta(text)) => yield Ok(text),
                        Ok(ChatEvent::Empty) => {}
                        Ok(ChatEvent::Done) => break 'read,
                        Err(e) => {
                            yield Err(e);
                            break 'read;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(tokens))
    }
}
