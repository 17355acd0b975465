//! Process-wide audio output.
//!
//! The device is looked up once at startup. Each playback opens its own output
//! stream on it and drops the stream when playback ends, so the hardware is only
//! held while something is actually playing.

use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info, warn};

use crate::error::PlaybackError;

/// Fully decoded 16-bit audio, ready for the device.
pub type DecodedAudio = rodio::buffer::SamplesBuffer<i16>;

/// Something that can play decoded audio to completion.
pub trait AudioOutput: Send + Sync {
    /// Blocks until `audio` has finished playing.
    fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError>;
}

#[derive(Debug, Clone)]
pub struct OutputDevice {
    /// Set only when the caller asked for a specific device and it exists.
    selected: Option<String>,
    name: String,
}

impl OutputDevice {
    /// Resolves the output device. `preferred` falls back to the default device
    /// when no device by that name is present.
    pub fn init(preferred: Option<&str>) -> Result<Self, PlaybackError> {
        let host = rodio::cpal::default_host();

        if let Some(wanted) = preferred {
            let found = host
                .output_devices()
                .map_err(|e| PlaybackError::Device(format!("Failed to enumerate devices: {e}")))?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));

            if found.is_some() {
                info!("Using output device: {}", wanted);
                return Ok(Self {
                    selected: Some(wanted.to_string()),
                    name: wanted.to_string(),
                });
            }
            warn!("Device '{}' not found, using default", wanted);
        }

        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no default output device".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "default".to_string());
        info!("Using default output device: {}", name);

        Ok(Self {
            selected: None,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn open_stream(&self) -> Result<(OutputStream, OutputStreamHandle), PlaybackError> {
        let Some(wanted) = self.selected.as_deref() else {
            return Ok(OutputStream::try_default()?);
        };

        let device = rodio::cpal::default_host()
            .output_devices()
            .map_err(|e| PlaybackError::Device(format!("Failed to enumerate devices: {e}")))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| PlaybackError::Device(format!("device '{wanted}' disappeared")))?;

        Ok(OutputStream::try_from_device(&device)?)
    }
}

impl AudioOutput for OutputDevice {
    fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        // `_stream` owns the device; dropping it at the end of this scope releases it.
        let (_stream, handle) = self.open_stream()?;
        let sink = Sink::try_new(&handle)?;

        debug!("Playing on {}", self.name);
        sink.append(audio);
        sink.sleep_until_end();
        Ok(())
    }
}

/// Stands in for an output device that could not be resolved at startup, so
/// every playback reports the original failure instead of aborting the process.
#[derive(Debug, Clone)]
pub struct MissingDevice {
    reason: String,
}

impl MissingDevice {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioOutput for MissingDevice {
    fn play(&self, _audio: DecodedAudio) -> Result<(), PlaybackError> {
        Err(PlaybackError::Device(self.reason.clone()))
    }
}
