//! Voice agent: transcripts in, spoken replies out.
//!
//! A transcript source (live microphone transcription or the HTTP control
//! surface) dispatches [`pipeline::TranscriptEvent`]s to the pipeline worker,
//! which streams a reply from the language model and speaks it through
//! `tts_core`.

pub mod config;
pub mod deepgram;
pub mod error;
pub mod http;
pub mod metrics;
pub mod microphone;
pub mod pipeline;
pub mod validation;

pub use config::{AgentConfig, DeepgramConfig};
pub use error::{ApiError, PipelineError};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{DispatchOutcome, Pipeline, PipelineHandle, TranscriptEvent, Utterance};
