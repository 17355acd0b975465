// Pipeline counters shared between the worker and the control surface

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::{PlaybackError, SessionError};

use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    utterances_processed: AtomicU64,
    utterances_skipped: AtomicU64,
    utterances_dropped: AtomicU64,
    sessions_ok: AtomicU64,
    connection_errors: AtomicU64,
    protocol_errors: AtomicU64,
    decode_errors: AtomicU64,
    device_errors: AtomicU64,
    worker_errors: AtomicU64,
    llm_errors: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    playbacks: AtomicU64,
    total_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_skipped(&self) {
        self.inner.utterances_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.inner.utterances_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self, frames: usize, bytes: usize) {
        self.inner.sessions_ok.fetch_add(1, Ordering::Relaxed);
        self.record_frames(frames, bytes);
    }

    /// Frames count even when the session that carried them failed.
    pub fn record_frames(&self, frames: usize, bytes: usize) {
        self.inner.frames_received.fetch_add(frames as u64, Ordering::Relaxed);
        self.inner.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_playback(&self) {
        self.inner.playbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &PipelineError) {
        let counter = match err {
            PipelineError::Llm(_) => &self.inner.llm_errors,
            PipelineError::Session(SessionError::Connection(_)) => &self.inner.connection_errors,
            PipelineError::Session(SessionError::Protocol(_)) => &self.inner.protocol_errors,
            PipelineError::Playback(PlaybackError::Decode(_)) => &self.inner.decode_errors,
            PipelineError::Playback(PlaybackError::Device(_)) => &self.inner.device_errors,
            PipelineError::Worker(_) => &self.inner.worker_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks one utterance as done, successful or not.
    pub fn record_utterance(&self, latency_ms: u64) {
        self.inner.utterances_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.inner.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);
    }

    pub fn utterances_processed(&self) -> u64 {
        self.inner.utterances_processed.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.utterances_processed();
        if count == 0 {
            return 0.0;
        }
        let total = self.inner.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let c = &self.inner;

        MetricsSnapshot {
            timestamp: Utc::now(),
            utterances: UtteranceStats {
                processed: load(&c.utterances_processed),
                skipped: load(&c.utterances_skipped),
                dropped: load(&c.utterances_dropped),
                avg_latency_ms: self.avg_latency_ms(),
                max_latency_ms: load(&c.max_latency_ms),
            },
            sessions: SessionStats {
                ok: load(&c.sessions_ok),
                frames_received: load(&c.frames_received),
                bytes_received: load(&c.bytes_received),
                playbacks: load(&c.playbacks),
            },
            errors: ErrorStats {
                connection: load(&c.connection_errors),
                protocol: load(&c.protocol_errors),
                decode: load(&c.decode_errors),
                device: load(&c.device_errors),
                worker: load(&c.worker_errors),
                llm: load(&c.llm_errors),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub utterances: UtteranceStats,
    pub sessions: SessionStats,
    pub errors: ErrorStats,
}

#[derive(Debug, Serialize)]
pub struct UtteranceStats {
    pub processed: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub ok: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub playbacks: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorStats {
    pub connection: u64,
    pub protocol: u64,
    pub decode: u64,
    pub device: u64,
    /// The blocking playback task died without reporting a result.
    pub worker: u64,
    pub llm: u64,
}
