use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, Source};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::{AudioOutput, DecodedAudio};
use crate::error::PlaybackError;
use crate::mp3;

/// Container format of the bytes the synthesizer streams back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
}

impl AudioFormat {
    /// Decodes the whole container up front, so a cut or corrupt buffer is
    /// rejected before anything reaches the device.
    fn decode(self, bytes: Vec<u8>) -> Result<DecodedAudio, PlaybackError> {
        match self {
            AudioFormat::Mp3 => decode_mp3(bytes),
            AudioFormat::Wav => decode_wav(bytes),
        }
    }
}

fn decode_mp3(bytes: Vec<u8>) -> Result<DecodedAudio, PlaybackError> {
    let frames = mp3::count_frames(&bytes).map_err(PlaybackError::Decode)?;
    debug!("Decoding {} MPEG frames", frames);

    let decoder = Decoder::new_mp3(Cursor::new(bytes))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    buffered(channels, sample_rate, decoder.collect())
}

fn decode_wav(bytes: Vec<u8>) -> Result<DecodedAudio, PlaybackError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    // A data chunk shorter than its header declares fails here with an I/O error.
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let shift = i32::from(spec.bits_per_sample) - 16;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| to_i16(v, shift)))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    buffered(spec.channels, spec.sample_rate, samples)
}

fn to_i16(sample: i32, shift: i32) -> i16 {
    if shift >= 0 {
        (sample >> shift) as i16
    } else {
        (sample << -shift) as i16
    }
}

fn buffered(
    channels: u16,
    sample_rate: u32,
    samples: Vec<i16>,
) -> Result<DecodedAudio, PlaybackError> {
    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(PlaybackError::Decode("container holds no samples".to_string()));
    }
    Ok(SamplesBuffer::new(channels, sample_rate, samples))
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Mp3 => f.write_str("mp3"),
            AudioFormat::Wav => f.write_str("wav"),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(format!("unsupported audio format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub frames: usize,
    pub bytes: usize,
    pub duration: Duration,
}

/// Collects the audio frames of one session, then plays them in one pass.
#[derive(Debug, Default)]
pub struct AudioSink {
    buffer: Vec<u8>,
    frames: usize,
}

impl AudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame in receive order.
    pub fn accumulate(&mut self, frame: Vec<u8>) {
        if self.buffer.is_empty() {
            self.buffer = frame;
        } else {
            self.buffer.extend_from_slice(&frame);
        }
        self.frames += 1;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Decodes the buffer as `format` and plays it on `output`, blocking until
    /// playback ends. The buffer is dropped whatever the outcome.
    ///
    /// An empty, truncated or undecodable buffer is a [`PlaybackError::Decode`]
    /// and `output` is never called.
    pub fn finalize(
        self,
        format: AudioFormat,
        output: &dyn AudioOutput,
    ) -> Result<PlaybackReport, PlaybackError> {
        let frames = self.frames;
        let bytes = self.buffer.len();

        if self.buffer.is_empty() {
            return Err(PlaybackError::Decode("no audio received".to_string()));
        }

        let audio = format.decode(self.buffer)?;
        let duration = audio.total_duration().unwrap_or_default();

        info!("Started streaming audio ({} frames, {} bytes, {})", frames, bytes, format);
        output.play(audio)?;

        Ok(PlaybackReport {
            frames,
            bytes,
            duration,
        })
    }
}
