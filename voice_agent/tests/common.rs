//! Common utilities for integration tests
#![allow(dead_code)]

use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::{SinkExt, StreamExt};
use llm_core::{LlmError, TokenSource, TokenStream};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tts_core::{AudioOutput, AudioFormat, DecodedAudio, PlaybackError, SynthesisConfig};
use voice_agent::Pipeline;

pub const SAMPLES_PER_REPLY: usize = 800;

/// How the mock synthesis server ends each session.
#[derive(Debug, Clone, Copy)]
pub enum Ending {
    /// Reply audio, then the final marker.
    Final,
    /// Reply audio, then a message that is not JSON.
    Garbage,
}

/// Serves any number of synthesis sessions. Every session is answered with
/// the same WAV reply, split across two frames, once the end message arrives.
pub struct SynthesisServer {
    pub base_url: String,
    sessions: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    chunks: Arc<Mutex<Vec<Vec<String>>>>,
}

impl SynthesisServer {
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Highest number of sessions that were open at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Chunk texts received, one list per session.
    pub fn chunks(&self) -> Vec<Vec<String>> {
        self.chunks.lock().unwrap().clone()
    }
}

fn audio_message(bytes: &[u8]) -> Message {
    Message::Text(json!({ "audio": general_purpose::STANDARD.encode(bytes) }).to_string())
}

pub async fn spawn_synthesis_server(ending: Ending) -> SynthesisServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let sessions = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let chunks = Arc::new(Mutex::new(Vec::new()));

    let server = SynthesisServer {
        base_url: format!("ws://{addr}"),
        sessions: sessions.clone(),
        max_active: max_active.clone(),
        chunks: chunks.clone(),
    };

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let sessions = sessions.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            let chunks = chunks.clone();

            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                sessions.fetch_add(1, Ordering::SeqCst);
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now_active, Ordering::SeqCst);

                let mut received = Vec::new();
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value.get("xi_api_key").is_some() {
                        continue;
                    }
                    let body = value["text"].as_str().unwrap_or_default();
                    if !body.is_empty() {
                        received.push(body.to_string());
                        continue;
                    }

                    // Bookkeeping happens before the reply so the client can
                    // never observe a session that is still counted as open.
                    chunks.lock().unwrap().push(std::mem::take(&mut received));
                    active.fetch_sub(1, Ordering::SeqCst);

                    let wav = sine_wav(SAMPLES_PER_REPLY, 16000);
                    let (head, tail) = wav.split_at(wav.len() / 2);
                    let _ = ws.send(audio_message(head)).await;
                    let _ = ws.send(audio_message(tail)).await;
                    let last = match ending {
                        Ending::Final => Message::Text(json!({ "isFinal": true }).to_string()),
                        Ending::Garbage => Message::Text("{{not json".to_string()),
                    };
                    let _ = ws.send(last).await;
                    break;
                }
            });
        }
    });

    server
}

/// A short mono 16-bit WAV file.
pub fn sine_wav(samples: usize, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for n in 0..samples {
            let t = n as f32 / sample_rate as f32;
            let amplitude = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
            writer.write_sample((amplitude * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Replies with a fixed token list and records every prompt.
#[derive(Default)]
pub struct ScriptedTokens {
    tokens: Vec<String>,
    fail: bool,
    prompts: Mutex<Vec<String>>,
    /// When set, each stream waits for one permit before starting.
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTokens {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Like `new`, but every stream blocks until the returned semaphore
    /// receives a permit.
    pub fn gated(tokens: &[&str]) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let source = Self {
            gate: Some(gate.clone()),
            ..Self::new(tokens)
        };
        (source, gate)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenSource for ScriptedTokens {
    async fn stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail {
            return Err(LlmError::Status {
                status: 500,
                body: "upstream unavailable".to_string(),
            });
        }
        let tokens: Vec<Result<String, LlmError>> =
            self.tokens.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures_util::stream::iter(tokens)))
    }
}

/// Records playback calls instead of touching a real device.
#[derive(Default)]
pub struct CountingOutput {
    plays: AtomicUsize,
    samples: AtomicUsize,
}

impl CountingOutput {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

impl AudioOutput for CountingOutput {
    fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.samples.fetch_add(audio.count(), Ordering::SeqCst);
        Ok(())
    }
}

pub fn synthesis_config(base_url: &str) -> SynthesisConfig {
    SynthesisConfig {
        base_url: base_url.to_string(),
        api_key: "xi-test".to_string(),
        ..SynthesisConfig::default()
    }
}

pub fn test_pipeline(
    tokens: Arc<ScriptedTokens>,
    output: Arc<CountingOutput>,
    base_url: &str,
) -> Pipeline {
    Pipeline::new(tokens, output, "voice-1", synthesis_config(base_url), AudioFormat::Wav)
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Guards a test body against hanging forever.
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test timed out")
}
