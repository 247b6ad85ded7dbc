//! Shared playhead between a playback slot and the audio callback.
//!
//! A [`MixerFeed`] holds one fully decoded track as interleaved stereo
//! samples at the output device rate. The audio callback mixes every feed
//! additively into its buffer, so during a crossfade both slots contribute
//! signal scaled by their own gain.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Interleaved stereo frame size.
const CHANNELS: usize = 2;

pub struct MixerFeed {
    samples: Mutex<Arc<Vec<f32>>>,
    /// Sample index (frame index times two).
    cursor: AtomicUsize,
    playing: AtomicBool,
    /// Final gain as f32 bits; crossfade and master volume pre-combined.
    gain: AtomicU32,
}

impl MixerFeed {
    pub fn new() -> MixerFeed {
        MixerFeed {
            samples: Mutex::new(Arc::new(Vec::new())),
            cursor: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            gain: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Replace the loaded audio. The cursor rewinds and playback stays off
    /// until [`set_playing`](Self::set_playing) turns it on.
    pub fn install(&self, samples: Arc<Vec<f32>>) {
        let mut guard = self.samples.lock().unwrap();
        *guard = samples;
        self.cursor.store(0, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.install(Arc::new(Vec::new()));
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::SeqCst);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::SeqCst))
    }

    pub fn position_frames(&self) -> usize {
        self.cursor.load(Ordering::SeqCst) / CHANNELS
    }

    pub fn len_frames(&self) -> usize {
        self.samples.lock().unwrap().len() / CHANNELS
    }

    /// Move the playhead, clamped to the end of the loaded audio.
    pub fn seek_frames(&self, frame: usize) {
        let max = self.samples.lock().unwrap().len();
        self.cursor
            .store((frame * CHANNELS).min(max), Ordering::SeqCst);
    }

    /// Mix this feed into an interleaved output buffer of `channels`-wide
    /// frames. Runs on the audio thread; holds the sample lock for the
    /// duration of one callback buffer.
    pub fn mix_into(&self, data: &mut [f32], channels: usize) {
        if !self.playing.load(Ordering::Relaxed) {
            return;
        }
        let samples = self.samples.lock().unwrap();
        let gain = f32::from_bits(self.gain.load(Ordering::Relaxed));
        let mut cursor = self.cursor.load(Ordering::Relaxed);
        for frame in data.chunks_mut(channels) {
            if cursor + 1 >= samples.len() {
                break;
            }
            frame[0] += samples[cursor] * gain;
            if channels > 1 {
                frame[1] += samples[cursor + 1] * gain;
            }
            cursor += CHANNELS;
        }
        self.cursor.store(cursor, Ordering::Relaxed);
    }
}

impl Default for MixerFeed {
    fn default() -> Self {
        MixerFeed::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_with(samples: Vec<f32>) -> MixerFeed {
        let feed = MixerFeed::new();
        feed.install(Arc::new(samples));
        feed
    }

    #[test]
    fn test_silent_until_playing() {
        let feed = feed_with(vec![1.0; 8]);
        feed.set_gain(1.0);
        let mut out = vec![0.0f32; 4];
        feed.mix_into(&mut out, 2);
        assert_eq!(out, vec![0.0; 4]);
        assert_eq!(feed.position_frames(), 0);
    }

    #[test]
    fn test_mixes_with_gain_and_advances() {
        let feed = feed_with(vec![0.5, -0.5, 0.25, -0.25]);
        feed.set_gain(0.5);
        feed.set_playing(true);
        let mut out = vec![0.0f32; 4];
        feed.mix_into(&mut out, 2);
        assert_eq!(out, vec![0.25, -0.25, 0.125, -0.125]);
        assert_eq!(feed.position_frames(), 2);
    }

    #[test]
    fn test_two_feeds_sum_into_one_buffer() {
        let a = feed_with(vec![0.25, 0.25]);
        let b = feed_with(vec![0.5, 0.5]);
        a.set_gain(1.0);
        b.set_gain(1.0);
        a.set_playing(true);
        b.set_playing(true);
        let mut out = vec![0.0f32; 2];
        a.mix_into(&mut out, 2);
        b.mix_into(&mut out, 2);
        assert_eq!(out, vec![0.75, 0.75]);
    }

    #[test]
    fn test_cursor_stops_at_end_of_samples() {
        let feed = feed_with(vec![0.1, 0.2]);
        feed.set_gain(1.0);
        feed.set_playing(true);
        let mut out = vec![0.0f32; 8];
        feed.mix_into(&mut out, 2);
        assert_eq!(&out[..2], &[0.1, 0.2]);
        assert_eq!(&out[2..], &[0.0; 6]);
        assert_eq!(feed.position_frames(), 1);
        assert_eq!(feed.len_frames(), 1);
    }

    #[test]
    fn test_seek_clamps_to_length() {
        let feed = feed_with(vec![0.0; 10]);
        feed.seek_frames(3);
        assert_eq!(feed.position_frames(), 3);
        feed.seek_frames(100);
        assert_eq!(feed.position_frames(), 5);
    }

    #[test]
    fn test_install_rewinds_and_pauses() {
        let feed = feed_with(vec![0.0; 6]);
        feed.set_playing(true);
        feed.seek_frames(2);
        feed.install(Arc::new(vec![0.0; 4]));
        assert!(!feed.is_playing());
        assert_eq!(feed.position_frames(), 0);
        assert_eq!(feed.len_frames(), 2);
    }
}
