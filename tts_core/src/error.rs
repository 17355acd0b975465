use thiserror::Error;

/// Failures of one synthesis session.
///
/// Both variants end the current session only; the caller decides whether the
/// audio accumulated so far is still worth playing.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The duplex stream could not be opened, or the init message could not be sent.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server sent something that is not a valid protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    pub fn connection(err: impl std::fmt::Display) -> Self {
        SessionError::Connection(err.to_string())
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        SessionError::Protocol(err.to_string())
    }
}

/// Failures of the decode-and-play pass.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("audio device error: {0}")]
    Device(String),
}

impl From<rodio::decoder::DecoderError> for PlaybackError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        PlaybackError::Decode(err.to_string())
    }
}

impl From<hound::Error> for PlaybackError {
    fn from(err: hound::Error) -> Self {
        PlaybackError::Decode(err.to_string())
    }
}

impl From<rodio::StreamError> for PlaybackError {
    fn from(err: rodio::StreamError) -> Self {
        PlaybackError::Device(err.to_string())
    }
}

impl From<rodio::PlayError> for PlaybackError {
    fn from(err: rodio::PlayError) -> Self {
        PlaybackError::Device(err.to_string())
    }
}
