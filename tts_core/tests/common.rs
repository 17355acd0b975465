//! Common utilities for integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tts_core::{AudioOutput, DecodedAudio, PlaybackError};

/// How the mock synthesis server answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// One audio frame per chunk (the chunk's own bytes), final marker after the end message.
    Echo,
    /// Like `Echo`, but closes the socket instead of sending a final marker.
    CloseOnEnd,
    /// Echoes the first chunk, answers the second with invalid JSON.
    MalformedOnSecondChunk,
    /// Right after init: one frame, the final marker, then one more frame.
    FinalImmediately,
}

pub struct MockServer {
    pub base_url: String,
    /// Every text message the client sent, parsed as JSON, in arrival order.
    pub received: Arc<Mutex<Vec<Value>>>,
    /// Request path and query of the websocket handshake.
    pub path: Arc<Mutex<Option<String>>>,
}

impl MockServer {
    pub fn messages(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn request_path(&self) -> Option<String> {
        self.path.lock().unwrap().clone()
    }
}

fn audio_message(bytes: &[u8]) -> Message {
    Message::Text(json!({ "audio": general_purpose::STANDARD.encode(bytes) }).to_string())
}

fn final_message() -> Message {
    Message::Text(json!({ "isFinal": true }).to_string())
}

/// Serves exactly one synthesis session on a random local port.
pub async fn spawn_mock_server(behavior: Behavior) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let path = Arc::new(Mutex::new(None));
    let log = received.clone();
    let seen_path = path.clone();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *seen_path.lock().unwrap() = Some(req.uri().to_string());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        let mut chunks_seen = 0usize;
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let value: Value = serde_json::from_str(&text).unwrap();
            log.lock().unwrap().push(value.clone());

            let body = value["text"].as_str().unwrap_or_default().to_string();
            let reply = if value.get("xi_api_key").is_some() {
                if let Behavior::FinalImmediately = behavior {
                    let _ = ws.send(audio_message(b"first")).await;
                    let _ = ws.send(final_message()).await;
                    let _ = ws.send(audio_message(b"late")).await;
                }
                continue;
            } else if body.is_empty() {
                match behavior {
                    Behavior::CloseOnEnd => {
                        let _ = ws.close(None).await;
                        break;
                    }
                    _ => final_message(),
                }
            } else {
                chunks_seen += 1;
                match behavior {
                    Behavior::MalformedOnSecondChunk if chunks_seen == 2 => {
                        Message::Text("this is not json".to_string())
                    }
                    _ => audio_message(body.as_bytes()),
                }
            };

            if ws.send(reply).await.is_err() {
                break;
            }
        }
    });

    MockServer {
        base_url: format!("ws://{addr}"),
        received,
        path,
    }
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

/// Silent MPEG-1 Layer III frames: 128 kbit/s, 44.1 kHz, joint stereo,
/// 417 bytes each with all-zero side info and main data.
pub fn silent_mp3(frames: usize) -> Vec<u8> {
    let mut frame = vec![0u8; 417];
    frame[..4].copy_from_slice(&[0xff, 0xfb, 0x90, 0x64]);
    frame.repeat(frames)
}

/// Records playback calls instead of touching a real device.
#[derive(Default)]
pub struct CountingOutput {
    pub plays: AtomicUsize,
    pub samples: AtomicUsize,
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

/// Always fails the way a missing sound card does.
pub struct UnavailableOutput;

impl AudioOutput for UnavailableOutput {
    fn play(&self, _audio: DecodedAudio) -> Result<(), PlaybackError> {
        Err(PlaybackError::Device("no output device".to_string()))
    }
}
