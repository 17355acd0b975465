//! Live microphone transcription over Deepgram's streaming websocket.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use tts_core::install_crypto_provider;

use crate::config::DeepgramConfig;
use crate::microphone::CaptureFormat;
use crate::pipeline::{PipelineHandle, TranscriptEvent};

const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;

pub fn listen_url(config: &DeepgramConfig, format: CaptureFormat) -> String {
    format!(
        "{}/v1/listen?model={}&smart_format=true&language={}&encoding=linear16&channels={}&sample_rate={}",
        config.base_url.trim_end_matches('/'),
        config.model,
        config.language,
        format.channels,
        format.sample_rate
    )
}

#[derive(Debug, Deserialize)]
struct LiveMessage {
    #[serde(rename = "type", default)]
    kind: String,
    channel: Option<LiveChannel>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiveChannel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Maps one server message to a transcript event. Metadata and speech
/// markers yield `None`.
fn parse_live_message(text: &str) -> Option<TranscriptEvent> {
    let message: LiveMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return Some(TranscriptEvent::Error {
                cause: format!("unparsable transcription message: {e}"),
            })
        }
    };

    match message.kind.as_str() {
        "Results" => {
            let text = message
                .channel
                .and_then(|c| c.alternatives.into_iter().next())
                .map(|a| a.transcript)
                .unwrap_or_default();
            Some(TranscriptEvent::Transcript { text })
        }
        "Error" => Some(TranscriptEvent::Error {
            cause: message
                .description
                .unwrap_or_else(|| "transcription service error".to_string()),
        }),
        _ => None,
    }
}

/// Streams microphone audio to Deepgram and dispatches every result.
///
/// Returns once the service closes the socket. Closing the `audio` channel
/// makes the client send `CloseStream`, after which the service flushes its
/// last results and closes.
pub async fn transcribe(
    config: DeepgramConfig,
    format: CaptureFormat,
    mut audio: UnboundedReceiver<Vec<u8>>,
    pipeline: PipelineHandle,
) -> Result<()> {
    let mut request = listen_url(&config, format)
        .into_client_request()
        .context("Invalid transcription URL")?;
    let token = HeaderValue::from_str(&format!("Token {}", config.api_key))
        .context("DEEPGRAM_API_KEY is not a valid header value")?;
    request.headers_mut().insert(AUTHORIZATION, token);

    install_crypto_provider();
    let (socket, _) = connect_async(request)
        .await
        .context("Could not open transcription socket")?;
    info!("Transcription socket open");
    let (mut write, mut read) = socket.split();

    let sender = tokio::spawn(async move {
        while let Some(pcm) = audio.recv().await {
            write.send(Message::Binary(pcm)).await?;
        }
        debug!("Microphone closed, finishing transcription stream");
        write.send(Message::Text(CLOSE_STREAM.to_string())).await
    });

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Some(event) = parse_live_message(&text) {
                    pipeline.dispatch(event);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                pipeline.dispatch(TranscriptEvent::Error {
                    cause: e.to_string(),
                });
                break;
            }
        }
    }

    if !sender.is_finished() {
        sender.abort();
    }
    match sender.await {
        Ok(Err(e)) => warn!("Transcription sender failed: {}", e),
        Err(e) if !e.is_cancelled() => warn!("Transcription sender task failed: {}", e),
        _ => {}
    }

    info!("Transcription socket closed");
    Ok(())
}
