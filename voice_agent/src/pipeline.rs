//! Transcript in, speech out.
//!
//! Transcripts are queued on a bounded channel and handled by a single worker,
//! one utterance at a time: the token source streams a reply, the reply is
//! chunked and synthesized over one session, and the collected audio is played
//! before the next utterance starts.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use llm_core::{TokenSource, TokenStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tts_core::{
    chunk_stream, AudioFormat, AudioOutput, AudioSink, PlaybackReport, SessionSummary,
    SynthesisConfig, SynthesisSession,
};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;

/// What a transcript source produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Transcript { text: String },
    Error { cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// Blank transcript or a source error; nothing was queued.
    Ignored,
    /// The queue was at capacity and the utterance was dropped.
    QueueFull,
    /// The worker has stopped.
    Closed,
}

#[derive(Debug)]
pub enum Utterance {
    Skipped,
    Spoken {
        session: SessionSummary,
        playback: PlaybackReport,
    },
}

pub struct Pipeline {
    tokens: Arc<dyn TokenSource>,
    output: Arc<dyn AudioOutput>,
    voice_id: String,
    synthesis: SynthesisConfig,
    format: AudioFormat,
    metrics: PipelineMetrics,
}

impl Pipeline {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        output: Arc<dyn AudioOutput>,
        voice_id: impl Into<String>,
        synthesis: SynthesisConfig,
        format: AudioFormat,
    ) -> Self {
        Self {
            tokens,
            output,
            voice_id: voice_id.into(),
            synthesis,
            format,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    /// Starts the worker. It runs until every handle has been dropped.
    pub fn spawn(self, capacity: usize) -> (PipelineHandle, JoinHandle<()>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let handle = PipelineHandle {
            queue,
            metrics: self.metrics.clone(),
        };
        let worker = tokio::spawn(self.run(rx));
        (handle, worker)
    }

    async fn run(self, mut rx: mpsc::Receiver<String>) {
        info!("Pipeline worker started");
        while let Some(text) = rx.recv().await {
            let span = info_span!("utterance", id = %Uuid::new_v4());
            async {
                match self.process(&text).await {
                    Ok(Utterance::Spoken { session, playback }) => info!(
                        chunks = session.chunks_sent,
                        frames = playback.frames,
                        bytes = playback.bytes,
                        "Utterance played"
                    ),
                    Ok(Utterance::Skipped) => debug!("Skipped blank utterance"),
                    Err(e) => error!("Utterance failed: {}", e),
                }
            }
            .instrument(span)
            .await;
        }
        info!("Pipeline worker stopped");
    }

    /// Speaks the reply to one transcript and waits until playback is done.
    pub async fn process(&self, text: &str) -> Result<Utterance, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            self.metrics.record_skipped();
            return Ok(Utterance::Skipped);
        }

        let started = Instant::now();
        let result = self.speak(text).await;
        if let Err(e) = &result {
            self.metrics.record_error(e);
        }
        self.metrics
            .record_utterance(started.elapsed().as_millis() as u64);
        result
    }

    async fn speak(&self, text: &str) -> Result<Utterance, PipelineError> {
        info!("Generating reply for: {}", text);
        let tokens = self.tokens.stream(text).await?;
        let session = SynthesisSession::open(&self.voice_id, &self.synthesis).await?;

        let mut sink = AudioSink::new();
        let summary = match session.run(chunk_stream(deltas(tokens)), &mut sink).await {
            Ok(summary) => {
                self.metrics
                    .record_session(summary.frames_received, summary.bytes_received);
                summary
            }
            Err(e) => {
                self.metrics.record_frames(sink.frame_count(), sink.len());
                if !sink.is_empty() {
                    warn!(
                        "Session failed after {} frames, playing what arrived",
                        sink.frame_count()
                    );
                    if let Err(playback_err) = self.play(sink).await {
                        warn!("Playback of partial audio failed: {}", playback_err);
                        self.metrics.record_error(&playback_err);
                    }
                }
                return Err(e.into());
            }
        };

        let playback = self.play(sink).await?;
        Ok(Utterance::Spoken {
            session: summary,
            playback,
        })
    }

    /// Decoding and playback block, so they run off the async workers.
    async fn play(&self, sink: AudioSink) -> Result<PlaybackReport, PipelineError> {
        let output = Arc::clone(&self.output);
        let format = self.format;
        let report = tokio::task::spawn_blocking(move || sink.finalize(format, &*output))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;
        self.metrics.record_playback();
        Ok(report)
    }
}

/// Text deltas up to the first token source failure.
fn deltas(mut tokens: TokenStream) -> impl Stream<Item = String> + Send + 'static {
    stream! {
        while let Some(token) = tokens.next().await {
            match token {
                Ok(text) => yield text,
                Err(e) => {
                    warn!("Token stream ended early: {}", e);
                    break;
                }
            }
        }
    }
}

/// Cheap to clone; every transcript source holds one.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    queue: mpsc::Sender<String>,
    metrics: PipelineMetrics,
}

impl PipelineHandle {
    pub fn dispatch(&self, event: TranscriptEvent) -> DispatchOutcome {
        let text = match event {
            TranscriptEvent::Transcript { text } => text,
            TranscriptEvent::Error { cause } => {
                error!("Transcription error: {}", cause);
                return DispatchOutcome::Ignored;
            }
        };

        let text = text.trim();
        if text.is_empty() {
            self.metrics.record_skipped();
            return DispatchOutcome::Ignored;
        }

        info!("Transcript: {}", text);
        match self.queue.try_send(text.to_string()) {
            Ok(()) => DispatchOutcome::Queued,
            Err(TrySendError::Full(dropped)) => {
                warn!("Pipeline busy, dropping utterance: {}", dropped);
                self.metrics.record_dropped();
                DispatchOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                error!("Pipeline worker is gone");
                DispatchOutcome::Closed
            }
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// A handle whose queue is read by the caller instead of a worker.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (queue, rx) = mpsc::channel(capacity);
        let handle = Self {
            queue,
            metrics: PipelineMetrics::new(),
        };
        (handle, rx)
    }
}
