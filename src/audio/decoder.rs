//! Audio decoding with symphonia.
//!
//! Tracks are decoded in full before playback starts, which is what lets
//! the engine preload the next track and switch without a load gap. Input
//! arrives as raw bytes (fetched from disk or HTTP) and comes out as
//! interleaved stereo f32 at the source sample rate.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Fully decoded track audio.
#[derive(Debug)]
pub struct DecodedAudio {
    /// Interleaved stereo samples in `-1.0..=1.0`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Decode an entire audio stream held in memory.
///
/// `extension` is a container hint taken from the URL, e.g. `"flac"`.
pub fn decode_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio> {
    let byte_len = data.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Media(format!("unrecognized audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Media("no audio track in stream".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Media("source reports no sample rate".to_string()))?;
    let channels = codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| Error::Media("source reports no channel layout".to_string()))?;

    debug!(
        "Decoding {byte_len} bytes: sample_rate={sample_rate}, channels={channels}"
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Media(format!("unsupported codec: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                warn!("Error reading packet, stopping decode: {e}");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    sample_buf = Some(SampleBuffer::new(capacity, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            // A corrupt packet is skippable; the stream may recover.
            Err(e) => warn!("Decode error in packet, skipping: {e}"),
        }
    }

    if samples.is_empty() {
        return Err(Error::Media("stream decoded to zero samples".to_string()));
    }

    let samples = to_stereo(samples, channels);
    debug!("Decoded {} stereo frames", samples.len() / 2);
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Normalize any channel count to interleaved stereo. Mono duplicates the
/// single channel; wider layouts keep the first two channels.
fn to_stereo(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    match channels {
        2 => samples,
        1 => {
            let mut stereo = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                stereo.push(s);
                stereo.push(s);
            }
            stereo
        }
        n => {
            let mut stereo = Vec::with_capacity((samples.len() / n) * 2);
            for frame in samples.chunks_exact(n) {
                stereo.push(frame[0]);
                stereo.push(frame[1]);
            }
            stereo
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let sample = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
                    * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    writer.write_sample(sample).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decodes_stereo_wav() {
        let bytes = wav_bytes(2, 44100, 4410);
        let audio = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.frames(), 4410);
        assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let bytes = wav_bytes(1, 22050, 1000);
        let audio = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.frames(), 1000);
        let left: Vec<f32> = audio.samples.iter().step_by(2).copied().collect();
        let right: Vec<f32> = audio.samples.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let err = decode_bytes(vec![0xde, 0xad, 0xbe, 0xef], None).unwrap_err();
        assert!(matches!(err, Error::Media(_)));
    }

    #[test]
    fn test_multichannel_keeps_front_pair() {
        let interleaved = vec![0.1, 0.2, 0.9, 0.3, 0.4, 0.9];
        assert_eq!(to_stereo(interleaved, 3), vec![0.1, 0.2, 0.3, 0.4]);
    }
}
