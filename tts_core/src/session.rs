//! Full-duplex synthesis session.
//!
//! Text chunks go out and audio frames come back over one websocket. The two
//! directions run concurrently: a spawned task drains the chunk stream into the
//! socket while the calling task reads audio into the [`AudioSink`]. The session
//! is over when the reader sees the final marker or the socket closes; the
//! writer finishing says nothing about whether all audio has arrived.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_core::Stream;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::protocol::{ClientMessage, ServerMessage, VoiceSettings};
use crate::sink::AudioSink;
use crate::tls::install_crypto_provider;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_BASE_URL: &str = "wss://api.elevenlabs.io";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Scheme and host of the service, e.g. `wss://api.elevenlabs.io`.
    pub base_url: String,
    pub model_id: String,
    pub api_key: String,
    pub voice_settings: VoiceSettings,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key: String::new(),
            voice_settings: VoiceSettings::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream-input?model_id={}",
            self.base_url.trim_end_matches('/'),
            voice_id,
            self.model_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    /// Reader done, waiting on the writer.
    Draining,
    Closed,
}

/// How the reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    FinalMarker,
    /// The socket closed (or failed) before a final marker arrived.
    ConnectionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub chunks_sent: usize,
    pub frames_received: usize,
    pub bytes_received: usize,
    pub termination: Termination,
}

pub struct SynthesisSession {
    voice_id: String,
    socket: Socket,
    state: SessionState,
}

impl SynthesisSession {
    /// Connects and sends the init message.
    pub async fn open(voice_id: &str, config: &SynthesisConfig) -> Result<Self, SessionError> {
        let url = config.endpoint(voice_id);
        install_crypto_provider();
        debug!(voice_id = %voice_id, state = ?SessionState::Connecting, "Opening synthesis session");

        let (mut socket, _response) = connect_async(url.as_str())
            .await
            .map_err(SessionError::connection)?;

        let init = ClientMessage::init(config.voice_settings, &config.api_key).to_json();
        socket
            .send(Message::Text(init))
            .await
            .map_err(SessionError::connection)?;

        debug!(voice_id = %voice_id, state = ?SessionState::Streaming, "Synthesis session open");
        Ok(Self {
            voice_id: voice_id.to_string(),
            socket,
            state: SessionState::Streaming,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Streams `chunks` out and audio into `sink` until the server is done.
    ///
    /// Frames received before a protocol error stay in `sink`.
    pub async fn run<S>(self, chunks: S, sink: &mut AudioSink) -> Result<SessionSummary, SessionError>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let voice_id = self.voice_id;
        let (writer, reader) = self.socket.split();

        let sent = Arc::new(AtomicUsize::new(0));
        let sender = tokio::spawn(send_chunks(writer, chunks, sent.clone()));

        let frames_before = sink.frame_count();
        let bytes_before = sink.len();
        let received = receive_frames(reader, sink).await;

        debug!(voice_id = %voice_id, state = ?SessionState::Draining, "Receiver finished");
        if !sender.is_finished() {
            // The server ended the session while the chunk source is still open.
            debug!(voice_id = %voice_id, "Aborting sender");
            sender.abort();
        }
        match sender.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(voice_id = %voice_id, "Sender stopped early: {}", e),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(voice_id = %voice_id, "Sender task failed: {}", e),
        }
        debug!(voice_id = %voice_id, state = ?SessionState::Closed, "Synthesis session closed");

        let termination = received?;
        let summary = SessionSummary {
            chunks_sent: sent.load(Ordering::Relaxed),
            frames_received: sink.frame_count() - frames_before,
            bytes_received: sink.len() - bytes_before,
            termination,
        };
        info!(
            voice_id = %voice_id,
            chunks = summary.chunks_sent,
            frames = summary.frames_received,
            bytes = summary.bytes_received,
            "Synthesis complete ({:?})",
            summary.termination
        );
        Ok(summary)
    }
}

async fn send_chunks<S>(
    mut writer: SplitSink<Socket, Message>,
    chunks: S,
    sent: Arc<AtomicUsize>,
) -> Result<(), tungstenite::Error>
where
    S: Stream<Item = String> + Send,
{
    futures_util::pin_mut!(chunks);
    while let Some(chunk) = chunks.next().await {
        writer
            .send(Message::Text(ClientMessage::chunk(&chunk).to_json()))
            .await?;
        sent.fetch_add(1, Ordering::Relaxed);
    }
    writer.send(Message::Text(ClientMessage::end().to_json())).await
}

async fn receive_frames(
    mut reader: SplitStream<Socket>,
    sink: &mut AudioSink,
) -> Result<Termination, SessionError> {
    while let Some(message) = reader.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Connection closed: {}", e);
                return Ok(Termination::ConnectionClosed);
            }
        };

        match message {
            Message::Text(text) => match ServerMessage::parse(&text)? {
                ServerMessage::Audio(frame) => sink.accumulate(frame),
                ServerMessage::Final => return Ok(Termination::FinalMarker),
                ServerMessage::Other => {}
            },
            Message::Close(frame) => {
                warn!("Connection closed: {:?}", frame);
                return Ok(Termination::ConnectionClosed);
            }
            _ => {}
        }
    }

    warn!("Connection closed");
    Ok(Termination::ConnectionClosed)
}
