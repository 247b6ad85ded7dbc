//! Gain curves for the crossfade between the two playback slots.
//!
//! A curve maps normalized fade progress (0.0 at the start of the fade,
//! 1.0 at the end) to a gain multiplier. The engine samples the curve on
//! a fixed tick schedule and applies the result on top of master volume.

use serde::{Deserialize, Serialize};

/// Number of gain updates per fade, independent of fade length.
pub(crate) const FADE_STEPS: u32 = 24;

/// Shape of the crossfade gain ramp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCurve {
    /// Straight-line ramp.
    Linear,
    /// Slow start, fast finish. Sounds gentler on fade-in.
    Exponential,
    /// Fast start, slow finish. Sounds gentler on fade-out.
    Logarithmic,
    /// Raised-cosine S-curve, smooth at both ends.
    #[default]
    CosineS,
}

impl FadeCurve {
    /// Gain for the incoming slot at fade progress `t`.
    pub fn fade_in(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            FadeCurve::Logarithmic => t.sqrt(),
            FadeCurve::CosineS => 0.5 * (1.0 - (t * std::f32::consts::PI).cos()),
        }
    }

    /// Gain for the outgoing slot at fade progress `t`.
    pub fn fade_out(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::Logarithmic => (1.0 - t).sqrt(),
            FadeCurve::CosineS => 0.5 * (1.0 + (t * std::f32::consts::PI).cos()),
        }
    }
}
