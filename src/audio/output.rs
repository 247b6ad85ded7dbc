//! Audio device output using cpal.
//!
//! One output stream serves both playback slots: the callback zeroes its
//! buffer, lets each [`MixerFeed`] add its signal, then clamps and converts
//! to the device sample format. cpal streams are not `Send`, so the stream
//! lives on a dedicated thread for the life of the process.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{error, info, warn};

use crate::audio::feed::MixerFeed;
use crate::error::{Error, Result};

pub struct AudioOutput {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Open the output device and start the mixing stream on its own thread.
pub fn spawn_output(
    device_name: Option<String>,
    feeds: [Arc<MixerFeed>; 2],
) -> Result<AudioOutput> {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    std::thread::Builder::new()
        .name("audio-output".to_string())
        .spawn(move || match open_stream(device_name.as_deref(), feeds) {
            Ok((stream, sample_rate, channels)) => {
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::AudioOutput(format!(
                        "failed to start stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok((sample_rate, channels)));
                // Keep the stream alive; dropping it stops audio.
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        })?;
    let (sample_rate, channels) = ready_rx
        .recv()
        .map_err(|_| Error::AudioOutput("audio thread exited during startup".to_string()))??;
    info!("Audio output running at {sample_rate}Hz, {channels} channels");
    Ok(AudioOutput {
        sample_rate,
        channels,
    })
}

fn open_stream(
    device_name: Option<&str>,
    feeds: [Arc<MixerFeed>; 2],
) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    let (config, sample_format) = best_config(&device)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, feeds)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, feeds)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, feeds)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "unsupported sample format: {other:?}"
            )));
        }
    };
    Ok((stream, sample_rate, channels))
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("failed to enumerate devices: {e}")))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using audio device: {name}");
            return Ok(device);
        }
        warn!("Audio device '{name}' not found, falling back to default");
    }
    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("no output device available".to_string()))
}

/// Prefer 44.1kHz stereo f32 to match the decoded format; otherwise take
/// whatever the device defaults to and let the sinks resample.
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("failed to query device configs: {e}")))?;
    let preferred = supported.find(|c| {
        c.channels() == 2
            && c.min_sample_rate().0 <= 44100
            && c.max_sample_rate().0 >= 44100
            && c.sample_format() == SampleFormat::F32
    });
    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        let config = config.with_sample_rate(cpal::SampleRate(44100)).config();
        return Ok((config, sample_format));
    }
    let config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("failed to get default config: {e}")))?;
    let sample_format = config.sample_format();
    Ok((config.config(), sample_format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    feeds: [Arc<MixerFeed>; 2],
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.clear();
                scratch.resize(data.len(), 0.0);
                for feed in &feeds {
                    feed.mix_into(&mut scratch, channels);
                }
                for (out, mixed) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(mixed.clamp(-1.0, 1.0));
                }
            },
            move |err| {
                error!("Audio stream error: {err}");
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("failed to build stream: {e}")))?;
    Ok(stream)
}
