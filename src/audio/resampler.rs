//! Sample-rate conversion with rubato.
//!
//! Decoded tracks are converted once, up front, to the output device rate.
//! `FastFixedIn` with a septic polynomial is a good quality/CPU tradeoff
//! for whole-track conversion.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::{Error, Result};

/// Resample interleaved stereo audio from `input_rate` to `output_rate`.
///
/// Returns the input unchanged when the rates already match.
pub fn resample(input: Vec<f32>, input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input);
    }
    if input.is_empty() {
        return Ok(input);
    }

    debug!("Resampling {input_rate}Hz -> {output_rate}Hz");

    let planar = deinterleave(&input);
    let input_frames = planar[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        2,
    )
    .map_err(|e| Error::Media(format!("failed to create resampler: {e}")))?;

    let planar_out = resampler
        .process(&planar, None)
        .map_err(|e| Error::Media(format!("resampling failed: {e}")))?;

    Ok(interleave(&planar_out))
}

/// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`.
fn deinterleave(samples: &[f32]) -> Vec<Vec<f32>> {
    let frames = samples.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }
    vec![left, right]
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar[0].len().min(planar[1].len());
    let mut out = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        out.push(planar[0][i]);
        out.push(planar[1][i]);
    }
    out
}
