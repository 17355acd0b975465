//! Microphone capture.
//!
//! Samples from the default input device are converted to 16-bit little-endian
//! PCM (`linear16`) at the device's own rate and channel count, and sent as one
//! byte buffer per device callback.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// Shape of the captured PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Starts capturing from the default input device.
///
/// Capture stops when the returned [`Stream`] is dropped, which also drops
/// `sender` and so closes the receiving side.
pub fn start_capture(sender: UnboundedSender<Vec<u8>>) -> Result<(Stream, CaptureFormat)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("Unable to find a default input device")?;
    let name = device.name().unwrap_or_else(|_| "default".to_string());

    let input_config = device
        .default_input_config()
        .context("Failed to fetch the default input configuration")?;

    let stream_config: StreamConfig = input_config.clone().into();
    let sample_format = input_config.sample_format();
    let format = CaptureFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };

    let err_fn = |err: cpal::StreamError| error!("Input stream error: {}", err);
    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| {
                let _ = sender.send(encode_f32(data));
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                let _ = sender.send(encode_i16(data));
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| {
                let _ = sender.send(encode_u16(data));
            },
            err_fn,
            None,
        )?,
        _ => {
            return Err(anyhow!(
                "input sample format {:?} is not supported",
                sample_format
            ));
        }
    };

    stream
        .play()
        .context("Failed to start the audio input stream")?;

    info!(
        "Capturing from {} at {} Hz, {} channel(s)",
        name, format.sample_rate, format.channels
    );
    Ok((stream, format))
}

fn encode_i16(input: &[i16]) -> Vec<u8> {
    input.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn encode_f32(input: &[f32]) -> Vec<u8> {
    input
        .iter()
        .flat_map(|s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
        .collect()
}

fn encode_u16(input: &[u16]) -> Vec<u8> {
    input
        .iter()
        .flat_map(|s| ((*s as i32 - 32768) as i16).to_le_bytes())
        .collect()
}
