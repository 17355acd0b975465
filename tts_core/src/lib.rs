//! Streaming text-to-speech core.
//!
//! - [`TextChunker`] buffers incremental model output into phrase-sized chunks.
//! - [`SynthesisSession`] sends chunks to the synthesis service and receives
//!   encoded audio frames over the same websocket, concurrently.
//! - [`AudioSink`] accumulates the frames of one session and plays them once
//!   the session is over, on an [`AudioOutput`] such as [`OutputDevice`].

mod chunker;
mod device;
mod error;
mod mp3;
mod protocol;
mod session;
mod sink;
mod stream;
mod tls;

pub use chunker::{chunk_all, chunk_stream, TextChunker, BOUNDARIES};
pub use device::{AudioOutput, DecodedAudio, MissingDevice, OutputDevice};
pub use error::{PlaybackError, SessionError};
pub use protocol::{ClientMessage, ServerMessage, VoiceSettings};
pub use session::{
    SessionState, SessionSummary, SynthesisConfig, SynthesisSession, Termination,
    DEFAULT_BASE_URL, DEFAULT_MODEL_ID,
};
pub use sink::{AudioFormat, AudioSink, PlaybackReport};
pub use stream::stream_speech;
pub use tls::install_crypto_provider;
