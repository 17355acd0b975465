//! Streaming synthesis helpers.
//!
//! [`stream_speech`] is the one-call form of a session: chunk an incremental
//! token stream, run it through a [`SynthesisSession`] and collect the audio
//! into an [`AudioSink`]. Playback is left to the caller because it blocks.

use futures_core::Stream;

use crate::chunker::chunk_stream;
use crate::error::SessionError;
use crate::session::{SessionSummary, SynthesisConfig, SynthesisSession};
use crate::sink::AudioSink;

/// Opens a session for `voice_id`, sends the chunked `tokens` and collects
/// the returned audio into `sink`.
pub async fn stream_speech<S>(
    voice_id: &str,
    config: &SynthesisConfig,
    tokens: S,
    sink: &mut AudioSink,
) -> Result<SessionSummary, SessionError>
where
    S: Stream<Item = String> + Send + 'static,
{
    let session = SynthesisSession::open(voice_id, config).await?;
    session.run(chunk_stream(tokens), sink).await
}
