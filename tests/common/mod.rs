//! Shared test infrastructure for integration tests.
//!
//! Provides an in-memory sink pair, a scripted source resolver, and a
//! harness that wires a full player (engine, pipeline, orchestrator,
//! shared state) around them without touching an audio device.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;

use segue::config::Settings;
use segue::engine::{AudioEngine, MediaSink, SlotState};
use segue::error::{Error, Result};
use segue::events::PlayerEvent;
use segue::library::LocalLibrary;
use segue::orchestrator::{NoopMetadataFetcher, Orchestrator, PlayerHandle};
use segue::quality::Quality;
use segue::resolve::{ResolveOptions, ResolvedUrl, SourceResolver, UrlPipeline};
use segue::state::SharedState;
use segue::track::Track;

/// In-memory sink. While playing, the position advances a little on every
/// poll, so the engine monitor sees movement the way it would with a real
/// output; `freeze` stops that to simulate a stall.
pub struct MockSink {
    loaded: Mutex<Option<String>>,
    playing: AtomicBool,
    gain: Mutex<f32>,
    position: Mutex<Duration>,
    duration: Mutex<Duration>,
    advance_per_poll: Mutex<Duration>,
    fail_next_load: AtomicBool,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            loaded: Mutex::new(None),
            playing: AtomicBool::new(false),
            gain: Mutex::new(1.0),
            position: Mutex::new(Duration::ZERO),
            duration: Mutex::new(Duration::from_secs(180)),
            advance_per_poll: Mutex::new(Duration::from_millis(200)),
            fail_next_load: AtomicBool::new(false),
        })
    }

    pub fn loaded_url(&self) -> Option<String> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock().unwrap() = position;
    }

    pub fn set_duration(&self, duration: Duration) {
        *self.duration.lock().unwrap() = duration;
    }

    /// Stop the per-poll position advance; the sink then looks stalled.
    pub fn freeze(&self) {
        *self.advance_per_poll.lock().unwrap() = Duration::ZERO;
    }

    pub fn fail_next_load(&self) {
        self.fail_next_load.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaSink for MockSink {
    async fn load(&self, url: &str) -> Result<()> {
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(Error::Media(format!("mock load failure: {url}")));
        }
        *self.loaded.lock().unwrap() = Some(url.to_string());
        self.playing.store(false, Ordering::SeqCst);
        *self.position.lock().unwrap() = Duration::ZERO;
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        if self.loaded.lock().unwrap().is_none() {
            return Err(Error::InvalidState("no source loaded".into()));
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.loaded.lock().unwrap() = None;
        self.playing.store(false, Ordering::SeqCst);
        *self.position.lock().unwrap() = Duration::ZERO;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        if self.loaded.lock().unwrap().is_none() {
            return Err(Error::InvalidState("no source loaded".into()));
        }
        *self.position.lock().unwrap() = position;
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        *self.gain.lock().unwrap() = gain;
    }

    fn gain(&self) -> f32 {
        *self.gain.lock().unwrap()
    }

    fn position(&self) -> Option<Duration> {
        if self.loaded.lock().unwrap().is_none() {
            return None;
        }
        let mut position = self.position.lock().unwrap();
        if self.playing.load(Ordering::SeqCst) {
            let step = *self.advance_per_poll.lock().unwrap();
            let total = *self.duration.lock().unwrap();
            *position = (*position + step).min(total);
        }
        Some(*position)
    }

    fn duration(&self) -> Option<Duration> {
        if self.loaded.lock().unwrap().is_none() {
            return None;
        }
        Some(*self.duration.lock().unwrap())
    }

    fn has_source(&self) -> bool {
        self.loaded.lock().unwrap().is_some()
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst) && self.has_source()
    }
}

/// Resolver returning `mock://<track id>` URLs, with per-track scripted
/// failures and a call log.
pub struct StaticResolver {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every resolution for this track id fails until `succeed` is called.
    pub fn fail(&self, track_id: &str) {
        self.failing.lock().unwrap().insert(track_id.to_string());
    }

    pub fn succeed(&self, track_id: &str) {
        self.failing.lock().unwrap().remove(track_id);
    }

    /// Track ids in resolution order, retries included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceResolver for StaticResolver {
    async fn resolve_url(
        &self,
        track: &Track,
        quality: Quality,
        _opts: &ResolveOptions,
    ) -> Result<ResolvedUrl> {
        self.calls.lock().unwrap().push(track.id.clone());
        if self.failing.lock().unwrap().contains(&track.id) {
            return Err(Error::NotFound(track.id.clone()));
        }
        Ok(ResolvedUrl {
            url: format!("mock://{}", track.id),
            quality,
        })
    }
}

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        source: "local".to_string(),
        name: format!("Track {id}"),
        artist: "Tester".to_string(),
        album: None,
        duration_ms: Some(180_000),
        available: [Quality::Q320k].into_iter().collect(),
        toggle: None,
    }
}

pub struct Harness {
    pub player: PlayerHandle,
    pub state: Arc<SharedState>,
    pub library: Arc<LocalLibrary>,
    pub engine: AudioEngine,
    pub sink_a: Arc<MockSink>,
    pub sink_b: Arc<MockSink>,
    pub resolver: Arc<StaticResolver>,
    pub events: broadcast::Receiver<PlayerEvent>,
}

/// Wire up and spawn a complete player over mock sinks.
pub fn start_player(library_tracks: Vec<Track>, settings: Settings) -> Harness {
    let sink_a = MockSink::new();
    let sink_b = MockSink::new();
    let resolver = StaticResolver::new();
    let library = Arc::new(LocalLibrary::from_tracks(library_tracks));
    let state = Arc::new(SharedState::new(settings.clone()));
    let events = state.subscribe();

    let (engine, sink_events) = AudioEngine::new(sink_a.clone(), sink_b.clone(), &settings);
    engine.spawn_monitor();

    let pipeline = Arc::new(UrlPipeline::new(resolver.clone(), state.bus.clone()));
    let (orchestrator, player) = Orchestrator::new(
        engine.clone(),
        sink_events,
        pipeline,
        state.clone(),
        library.clone(),
        Arc::new(NoopMetadataFetcher),
    );
    orchestrator.spawn();

    Harness {
        player,
        state,
        library,
        engine,
        sink_a,
        sink_b,
        resolver,
        events,
    }
}

/// Next event off the bus, failing the test after a (virtual) minute.
pub async fn next_event(rx: &mut broadcast::Receiver<PlayerEvent>) -> PlayerEvent {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed")
}

/// Skips events until one matches, failing the test after a (virtual)
/// minute per event.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<PlayerEvent>, mut matches: F) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Polls until the standby slot has a decoded track waiting.
pub async fn wait_standby_ready(harness: &Harness) {
    timeout(Duration::from_secs(60), async {
        while harness.engine.standby_state() != SlotState::Ready {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("standby slot never became ready");
}
