//! The production [`MediaSink`]: fetch, decode, resample, then play out of
//! a fully buffered [`MixerFeed`].
//!
//! A `load` resolves the whole chain before returning, so once a sink
//! reports ready it can start within one audio callback. Concurrent loads
//! on the same sink supersede each other; only the most recent call
//! installs its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::audio::decoder;
use crate::audio::feed::MixerFeed;
use crate::audio::fetch::SourceFetcher;
use crate::audio::resampler;
use crate::engine::MediaSink;
use crate::error::{Error, Result};

struct LoadedSource {
    url: String,
    frames: usize,
}

pub struct BufferSink {
    feed: Arc<MixerFeed>,
    fetcher: SourceFetcher,
    output_rate: u32,
    loaded: Mutex<Option<LoadedSource>>,
    load_generation: AtomicU64,
}

impl BufferSink {
    pub fn new(feed: Arc<MixerFeed>, fetcher: SourceFetcher, output_rate: u32) -> BufferSink {
        BufferSink {
            feed,
            fetcher,
            output_rate,
            loaded: Mutex::new(None),
            load_generation: AtomicU64::new(0),
        }
    }

    fn frames_to_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.output_rate))
    }
}

#[async_trait]
impl MediaSink for BufferSink {
    async fn load(&self, url: &str) -> Result<()> {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Loading source: {url}");
        let (bytes, hint) = self.fetcher.fetch(url).await?;
        let output_rate = self.output_rate;
        let samples = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let audio = decoder::decode_bytes(bytes, hint.as_deref())?;
            resampler::resample(audio.samples, audio.sample_rate, output_rate)
        })
        .await
        .map_err(|e| Error::Internal(format!("decode task failed: {e}")))??;

        if self.load_generation.load(Ordering::SeqCst) != generation {
            debug!("Load of {url} superseded, dropping decoded audio");
            return Ok(());
        }
        let frames = samples.len() / 2;
        self.feed.install(Arc::new(samples));
        *self.loaded.lock().unwrap() = Some(LoadedSource {
            url: url.to_string(),
            frames,
        });
        debug!(
            "Loaded {url}: {frames} frames at {output_rate}Hz ({:?})",
            self.frames_to_duration(frames)
        );
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        if self.loaded.lock().unwrap().is_none() {
            return Err(Error::InvalidState("no source loaded".into()));
        }
        self.feed.set_playing(true);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.feed.set_playing(false);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Invalidate any in-flight load as well.
        self.load_generation.fetch_add(1, Ordering::SeqCst);
        self.feed.clear();
        if let Some(old) = self.loaded.lock().unwrap().take() {
            debug!("Cleared source: {}", old.url);
        }
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        if self.loaded.lock().unwrap().is_none() {
            return Err(Error::InvalidState("no source loaded".into()));
        }
        let frame = (position.as_secs_f64() * f64::from(self.output_rate)) as usize;
        self.feed.seek_frames(frame);
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        self.feed.set_gain(gain);
    }

    fn gain(&self) -> f32 {
        self.feed.gain()
    }

    fn position(&self) -> Option<Duration> {
        self.loaded.lock().unwrap().as_ref()?;
        Some(self.frames_to_duration(self.feed.position_frames()))
    }

    fn duration(&self) -> Option<Duration> {
        let loaded = self.loaded.lock().unwrap();
        loaded.as_ref().map(|l| self.frames_to_duration(l.frames))
    }

    fn has_source(&self) -> bool {
        self.loaded.lock().unwrap().is_some()
    }

    fn is_playing(&self) -> bool {
        self.feed.is_playing()
    }
}
