//! Production audio backend: fetch, decode, resample, mix, output.
//!
//! The engine talks to this module only through the [`MediaSink`] trait.
//! [`build_sinks`] wires the whole chain: one cpal output stream, two
//! [`MixerFeed`]s it mixes, and a [`BufferSink`] per feed.
//!
//! [`MediaSink`]: crate::engine::MediaSink

pub mod decoder;
pub mod feed;
pub mod fetch;
pub mod output;
pub mod resampler;
pub mod sink;

use std::sync::Arc;

pub use feed::MixerFeed;
pub use fetch::SourceFetcher;
pub use output::AudioOutput;
pub use sink::BufferSink;

use crate::error::Result;

/// Open the audio device and build the two playback sinks over it.
pub fn build_sinks(device_name: Option<String>) -> Result<(Arc<BufferSink>, Arc<BufferSink>)> {
    let feed_a = Arc::new(MixerFeed::new());
    let feed_b = Arc::new(MixerFeed::new());
    let output = output::spawn_output(device_name, [feed_a.clone(), feed_b.clone()])?;
    let fetcher = SourceFetcher::new();
    Ok((
        Arc::new(BufferSink::new(feed_a, fetcher.clone(), output.sample_rate)),
        Arc::new(BufferSink::new(feed_b, fetcher, output.sample_rate)),
    ))
}
