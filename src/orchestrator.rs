//! Playback orchestration.
//!
//! A single task owns the play queue and drives the audio engine from three
//! inputs: player commands from the API layer, per-slot sink events from the
//! engine, and completions of the resolution and load tasks it spawns. All
//! playback mutation happens on this task; handlers only send commands and
//! read [`SharedState`] snapshots.
//!
//! Resolution and decoding run as spawned tasks so a slow source never
//! blocks command handling. Every completion message carries the track it
//! was started for and is dropped when that track is no longer current; the
//! pipeline and the engine apply their own supersession underneath, so a
//! stale completion is never audible even before this check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::{AudioEngine, SinkEvent, SinkEventKind, SlotState};
use crate::error::Result;
use crate::events::{PlaybackState, PlayerEvent, QueueChangeTrigger};
use crate::library::LocalLibrary;
use crate::queue::{Advance, PlayMode, PlayQueue};
use crate::resolve::{ResolvedUrl, UrlPipeline};
use crate::state::{NowPlaying, QueueSnapshot, SharedState};
use crate::track::{ListId, Track};

/// Commands accepted by the orchestrator.
#[derive(Debug)]
pub enum PlayerCommand {
    Play,
    Pause,
    TogglePlay,
    Stop,
    Next,
    Previous,
    /// Start a specific list entry, replacing the active list if needed.
    PlayTrack { list_id: ListId, index: usize },
    /// Append to the temp queue (or push to its front with `play_next`).
    Enqueue { tracks: Vec<Track>, play_next: bool },
    ClearTemp,
    SetPlayMode(PlayMode),
    Seek { position_ms: u64 },
    SetVolume(f32),
    Shutdown,
}

/// Cloneable sending half handed to the API layer.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<PlayerCommand>,
}

impl PlayerHandle {
    pub fn send(&self, command: PlayerCommand) {
        if self.tx.send(command).is_err() {
            warn!("Player command dropped, orchestrator is gone");
        }
    }
}

/// Post-change metadata enrichment, run off the command loop after a track
/// becomes current. The result is applied only if that track is still
/// current when it arrives.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Returns an enriched copy of the track, or `None` when there is
    /// nothing to add.
    async fn enrich(&self, track: &Track) -> Result<Option<Track>>;
}

/// Fetcher that never adds anything. Local files carry their metadata from
/// the library scan.
pub struct NoopMetadataFetcher;

#[async_trait]
impl MetadataFetcher for NoopMetadataFetcher {
    async fn enrich(&self, _track: &Track) -> Result<Option<Track>> {
        Ok(None)
    }
}

/// Completions reported back by spawned tasks.
enum TaskDone {
    ActiveResolved {
        track: Track,
        outcome: Result<Option<ResolvedUrl>>,
    },
    ActiveLoaded {
        track_id: String,
        outcome: Result<()>,
    },
    PreloadResolved {
        track: Track,
        outcome: Result<Option<ResolvedUrl>>,
    },
    PreloadLoaded {
        track_id: String,
        outcome: Result<()>,
    },
    Enriched {
        track_id: String,
        track: Track,
    },
}

/// The upcoming track being resolved or already decoded on the standby
/// slot. Whether the slot is actually ready comes from the engine.
struct Preload {
    track: Track,
}

enum Step {
    Next,
    Previous,
}

pub struct Orchestrator {
    queue: PlayQueue,
    engine: AudioEngine,
    pipeline: Arc<UrlPipeline>,
    state: Arc<SharedState>,
    library: Arc<LocalLibrary>,
    metadata: Arc<dyn MetadataFetcher>,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    sink_events: mpsc::UnboundedReceiver<SinkEvent>,
    tasks_tx: mpsc::UnboundedSender<TaskDone>,
    tasks_rx: mpsc::UnboundedReceiver<TaskDone>,
    preload: Option<Preload>,
    /// One preload kick per current track, on its first `Playing` event.
    preload_started: bool,
    /// Watchdog for a load or rebuffer that never completes.
    stall_deadline: Option<Instant>,
    /// Pending automatic skip after a playback error.
    auto_skip_deadline: Option<Instant>,
    /// Track already reported as failed. A load error reaches us both as a
    /// task result and as a sink event; the second report is dropped.
    failed_track: Option<String>,
    last_progress: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        engine: AudioEngine,
        sink_events: mpsc::UnboundedReceiver<SinkEvent>,
        pipeline: Arc<UrlPipeline>,
        state: Arc<SharedState>,
        library: Arc<LocalLibrary>,
        metadata: Arc<dyn MetadataFetcher>,
    ) -> (Self, PlayerHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            queue: PlayQueue::new(),
            engine,
            pipeline,
            state,
            library,
            metadata,
            commands,
            sink_events,
            tasks_tx,
            tasks_rx,
            preload: None,
            preload_started: false,
            stall_deadline: None,
            auto_skip_deadline: None,
            failed_track: None,
            last_progress: None,
        };
        (orchestrator, PlayerHandle { tx })
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&mut self) {
        info!("Orchestrator running");
        let mode = self.state.settings().await.play_mode;
        self.queue.set_mode(mode);
        self.sync_queue_snapshot().await;
        loop {
            let stall = deadline_sleep(self.stall_deadline);
            let auto_skip = deadline_sleep(self.auto_skip_deadline);
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if matches!(command, PlayerCommand::Shutdown) {
                        break;
                    }
                    self.handle_command(command).await;
                }
                Some(event) = self.sink_events.recv() => {
                    self.handle_sink_event(event).await;
                }
                Some(done) = self.tasks_rx.recv() => {
                    self.handle_task(done).await;
                }
                _ = stall => {
                    self.stall_deadline = None;
                    self.on_load_stalled().await;
                }
                _ = auto_skip => {
                    self.auto_skip_deadline = None;
                    info!("Auto-skipping after playback error");
                    self.step(Step::Next, false).await;
                }
            }
        }
        info!("Orchestrator stopping");
        self.pipeline.cancel_all().await;
        self.engine.stop_all().await;
    }

    async fn handle_command(&mut self, command: PlayerCommand) {
        debug!("Command: {command:?}");
        match command {
            PlayerCommand::Play => self.play().await,
            PlayerCommand::Pause => self.pause().await,
            PlayerCommand::TogglePlay => {
                if self.state.playback_state().await == PlaybackState::Playing {
                    self.pause().await;
                } else {
                    self.play().await;
                }
            }
            PlayerCommand::Stop => self.halt().await,
            PlayerCommand::Next => self.step(Step::Next, true).await,
            PlayerCommand::Previous => self.step(Step::Previous, true).await,
            PlayerCommand::PlayTrack { list_id, index } => self.play_track(list_id, index).await,
            PlayerCommand::Enqueue { tracks, play_next } => self.enqueue(tracks, play_next).await,
            PlayerCommand::ClearTemp => self.clear_temp().await,
            PlayerCommand::SetPlayMode(mode) => self.set_play_mode(mode).await,
            PlayerCommand::Seek { position_ms } => self.seek(position_ms).await,
            PlayerCommand::SetVolume(volume) => self.set_volume(volume).await,
            // Intercepted by the run loop before dispatch.
            PlayerCommand::Shutdown => {}
        }
    }

    async fn play(&mut self) {
        if self.engine.active_has_source() {
            if let Err(e) = self.engine.resume().await {
                warn!("Resume failed: {e}");
            }
            return;
        }
        // Engine is empty. Re-resolve the current track if there is one
        // (a previous load failed), otherwise pull the next queue entry,
        // which covers enqueue-then-play from a stopped player.
        if let Some(current) = self.queue.current_track().cloned() {
            self.failed_track = None;
            self.state.set_playback_state(PlaybackState::Playing).await;
            self.start_track(current).await;
        } else {
            self.step(Step::Next, true).await;
        }
    }

    async fn pause(&mut self) {
        if let Err(e) = self.engine.pause().await {
            debug!("Pause ignored: {e}");
            return;
        }
        if self.engine.active_has_source() {
            self.state.set_playback_state(PlaybackState::Paused).await;
        }
    }

    /// Stop requested or queue exhausted: silence everything and drop the
    /// current track.
    async fn halt(&mut self) {
        self.pipeline.cancel_all().await;
        self.engine.stop_all().await;
        self.queue.clear_current();
        self.preload = None;
        self.preload_started = false;
        self.stall_deadline = None;
        self.auto_skip_deadline = None;
        self.failed_track = None;
        self.last_progress = None;
        self.state.set_now_playing(None).await;
        self.state.set_playback_state(PlaybackState::Stopped).await;
    }

    async fn step(&mut self, step: Step, manual: bool) {
        let temp_before = self.queue.temp_len();
        let advance = match step {
            Step::Next => self.queue.advance_next(manual),
            Step::Previous => self.queue.advance_previous(manual),
        };
        if self.queue.temp_len() < temp_before {
            self.state.bus.emit_lossy(PlayerEvent::queue_changed(
                self.queue.temp_ids(),
                QueueChangeTrigger::Consumed,
            ));
            self.sync_queue_snapshot().await;
        }
        match advance {
            Advance::Track(track) => self.begin_current(track).await,
            Advance::Stop => {
                info!("Queue exhausted, stopping");
                self.halt().await;
            }
        }
    }

    async fn play_track(&mut self, list_id: ListId, index: usize) {
        if list_id != self.library.list_id() {
            warn!("Unknown list {list_id}");
            self.state.bus.emit_lossy(PlayerEvent::playback_error(
                None,
                format!("unknown list: {list_id}"),
                false,
            ));
            return;
        }
        let temp_before = self.queue.temp_len();
        let tracks = self.library.tracks().to_vec();
        match self.queue.play_from_list(tracks, list_id, index) {
            Ok(track) => {
                if temp_before > 0 && self.queue.temp_len() == 0 {
                    self.state.bus.emit_lossy(PlayerEvent::queue_changed(
                        Vec::new(),
                        QueueChangeTrigger::Cleared,
                    ));
                }
                self.sync_queue_snapshot().await;
                self.begin_current(track).await;
            }
            Err(e) => {
                warn!("Play from list failed: {e}");
                self.state
                    .bus
                    .emit_lossy(PlayerEvent::playback_error(None, e.to_string(), false));
            }
        }
    }

    async fn enqueue(&mut self, tracks: Vec<Track>, play_next: bool) {
        if tracks.is_empty() {
            return;
        }
        let ids = self.queue.enqueue(tracks, play_next);
        debug!("Enqueued {} tracks", ids.len());
        self.state.bus.emit_lossy(PlayerEvent::queue_changed(
            self.queue.temp_ids(),
            QueueChangeTrigger::Enqueued,
        ));
        self.sync_queue_snapshot().await;
        self.refresh_preload().await;
    }

    async fn clear_temp(&mut self) {
        if self.queue.temp_len() == 0 {
            return;
        }
        self.queue.clear_temp();
        self.state.bus.emit_lossy(PlayerEvent::queue_changed(
            Vec::new(),
            QueueChangeTrigger::Cleared,
        ));
        self.sync_queue_snapshot().await;
        self.refresh_preload().await;
    }

    async fn set_play_mode(&mut self, mode: PlayMode) {
        let old_mode = self.queue.mode();
        if !self.queue.set_mode(mode) {
            return;
        }
        self.state.update_settings(|s| s.play_mode = mode).await;
        self.state
            .bus
            .emit_lossy(PlayerEvent::play_mode_changed(old_mode, mode));
        self.sync_queue_snapshot().await;
        self.refresh_preload().await;
    }

    async fn seek(&mut self, position_ms: u64) {
        match self.engine.seek(Duration::from_millis(position_ms)).await {
            Ok(()) => {
                let duration_ms = self.engine.duration().map(|d| d.as_millis() as u64);
                self.state.update_position(position_ms, duration_ms).await;
                self.state.bus.emit_lossy(PlayerEvent::progress(
                    position_ms,
                    duration_ms.unwrap_or(0),
                ));
            }
            Err(e) => debug!("Seek ignored: {e}"),
        }
    }

    async fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let old_volume = self.state.settings().await.volume;
        self.engine.set_volume(volume);
        self.state.update_settings(|s| s.volume = volume).await;
        if (old_volume - volume).abs() > f32::EPSILON {
            self.state
                .bus
                .emit_lossy(PlayerEvent::volume_changed(old_volume, volume));
        }
    }

    /// Makes `track` the externally visible current track and starts
    /// bringing audio up for it.
    async fn begin_current(&mut self, track: Track) {
        let (list_id, is_temp) = match self.queue.current() {
            Some(current) => (current.list_id.clone(), current.is_temp),
            None => (None, false),
        };
        info!("Now playing: {} - {}", track.artist, track.name);
        self.state
            .set_now_playing(Some(NowPlaying::starting(
                track.clone(),
                list_id.clone(),
                is_temp,
            )))
            .await;
        self.state
            .bus
            .emit_lossy(PlayerEvent::track_changed(track.clone(), list_id));
        self.state.set_playback_state(PlaybackState::Playing).await;
        self.preload_started = false;
        self.failed_track = None;
        self.last_progress = None;
        self.spawn_enrich(track.clone());
        self.start_track(track).await;
    }

    /// Brings audio up for `track`: crossfades into the preloaded standby
    /// slot when it holds this track, otherwise resolves a fresh URL and
    /// cold-starts.
    async fn start_track(&mut self, track: Track) {
        self.auto_skip_deadline = None;
        self.arm_stall_timer().await;

        let matches = self
            .preload
            .as_ref()
            .is_some_and(|p| p.track.id == track.id);
        if matches && self.engine.standby_state() == SlotState::Ready {
            self.preload = None;
            match self.engine.switch_to_ready().await {
                Ok(true) => {
                    debug!("Switched to preloaded {}", track.id);
                    self.stall_deadline = None;
                    return;
                }
                Ok(false) => debug!("Standby lost readiness, cold starting {}", track.id),
                Err(e) => warn!("Switch to preloaded track failed: {e}"),
            }
        }
        self.spawn_active_resolve(track).await;
    }

    /// Starts a foreground resolution. The cold start it leads to clears
    /// the standby slot, so any preload ticket is void from here on.
    async fn spawn_active_resolve(&mut self, track: Track) {
        self.preload = None;
        let quality = self.state.settings().await.preferred_quality;
        let pipeline = self.pipeline.clone();
        let tx = self.tasks_tx.clone();
        tokio::spawn(async move {
            let outcome = pipeline.resolve_active(&track, quality).await;
            let _ = tx.send(TaskDone::ActiveResolved { track, outcome });
        });
    }

    fn spawn_active_load(&self, track_id: String, url: String) {
        let engine = self.engine.clone();
        let tx = self.tasks_tx.clone();
        tokio::spawn(async move {
            let outcome = engine.start(&url).await;
            let _ = tx.send(TaskDone::ActiveLoaded { track_id, outcome });
        });
    }

    fn spawn_enrich(&self, track: Track) {
        let metadata = self.metadata.clone();
        let tx = self.tasks_tx.clone();
        tokio::spawn(async move {
            match metadata.enrich(&track).await {
                Ok(Some(enriched)) => {
                    let _ = tx.send(TaskDone::Enriched {
                        track_id: track.id,
                        track: enriched,
                    });
                }
                Ok(None) => {}
                Err(e) => debug!("Metadata fetch failed for {}: {e}", track.id),
            }
        });
    }

    /// Re-evaluates what the standby slot should hold. Called whenever the
    /// next pick may have changed: queue mutations, mode changes, near-end.
    async fn refresh_preload(&mut self) {
        if !self.preload_started || self.queue.current().is_none() {
            return;
        }
        let desired = self.queue.peek_next();
        match (&desired, &self.preload) {
            (Some(next), Some(ticket)) if next.id == ticket.track.id => return,
            (None, None) => return,
            _ => {}
        }
        self.preload = None;
        self.engine.clear_standby().await;
        let Some(next) = desired else { return };
        debug!("Preloading {}", next.id);
        self.preload = Some(Preload {
            track: next.clone(),
        });
        let quality = self.state.settings().await.preferred_quality;
        let pipeline = self.pipeline.clone();
        let tx = self.tasks_tx.clone();
        tokio::spawn(async move {
            let outcome = pipeline.resolve_preload(&next, quality).await;
            let _ = tx.send(TaskDone::PreloadResolved {
                track: next,
                outcome,
            });
        });
    }

    fn current_id(&self) -> Option<&str> {
        self.queue.current_track().map(|t| t.id.as_str())
    }

    async fn sync_queue_snapshot(&self) {
        self.state
            .set_queue_snapshot(QueueSnapshot {
                mode: self.queue.mode(),
                list_id: self.queue.list_id().map(String::from),
                list_len: self.queue.list_len(),
                temp: self.queue.temp_entries(),
            })
            .await;
    }

    async fn handle_task(&mut self, done: TaskDone) {
        match done {
            TaskDone::ActiveResolved { track, outcome } => {
                if self.current_id() != Some(track.id.as_str()) {
                    debug!("Dropping stale resolution for {}", track.id);
                    return;
                }
                match outcome {
                    Ok(Some(resolved)) => {
                        debug!("Resolved {} at {}", track.id, resolved.quality);
                        self.spawn_active_load(track.id, resolved.url);
                    }
                    Ok(None) => debug!("Resolution for {} superseded", track.id),
                    Err(e) => self.playback_failed(&track.id, &e.to_string()).await,
                }
            }
            TaskDone::ActiveLoaded { track_id, outcome } => {
                if self.current_id() != Some(track_id.as_str()) {
                    return;
                }
                match outcome {
                    Ok(()) => {
                        self.stall_deadline = None;
                        // Duration becomes known once the source is decoded.
                        let duration_ms = self.engine.duration().map(|d| d.as_millis() as u64);
                        self.state.update_position(0, duration_ms).await;
                    }
                    Err(e) => self.playback_failed(&track_id, &e.to_string()).await,
                }
            }
            TaskDone::PreloadResolved { track, outcome } => {
                if self.preload.as_ref().map(|p| p.track.id.as_str()) != Some(track.id.as_str()) {
                    return;
                }
                match outcome {
                    Ok(Some(resolved)) => {
                        let engine = self.engine.clone();
                        let tx = self.tasks_tx.clone();
                        tokio::spawn(async move {
                            let outcome = engine.preload(&resolved.url).await;
                            let _ = tx.send(TaskDone::PreloadLoaded {
                                track_id: track.id,
                                outcome,
                            });
                        });
                    }
                    Ok(None) => self.preload = None,
                    Err(e) => {
                        debug!("Preload resolve failed for {}: {e}", track.id);
                        self.preload = None;
                    }
                }
            }
            TaskDone::PreloadLoaded { track_id, outcome } => {
                if self.preload.as_ref().map(|p| p.track.id.as_str()) != Some(track_id.as_str()) {
                    return;
                }
                match outcome {
                    Ok(()) => debug!("Preload ready: {track_id}"),
                    Err(e) => {
                        debug!("Preload failed for {track_id}: {e}");
                        self.preload = None;
                    }
                }
            }
            TaskDone::Enriched { track_id, track } => {
                if self.current_id() != Some(track_id.as_str()) {
                    return;
                }
                let list_id = self.queue.current().and_then(|c| c.list_id.clone());
                if let Some(mut now) = self.state.now_playing().await {
                    now.duration_ms = now.duration_ms.or(track.duration_ms);
                    now.track = track.clone();
                    self.state.set_now_playing(Some(now)).await;
                }
                self.state
                    .bus
                    .emit_lossy(PlayerEvent::track_changed(track, list_id));
            }
        }
    }

    async fn handle_sink_event(&mut self, event: SinkEvent) {
        if event.slot != self.engine.active_slot() {
            // Standby slot chatter; preload failures already surface
            // through the load task result.
            if let SinkEventKind::Error(message) = event.kind {
                debug!("Standby slot {} error: {message}", event.slot);
            }
            return;
        }
        match event.kind {
            SinkEventKind::Playing => {
                self.stall_deadline = None;
                self.state.set_playback_state(PlaybackState::Playing).await;
                if !self.preload_started {
                    self.preload_started = true;
                    self.refresh_preload().await;
                }
            }
            SinkEventKind::Paused => {
                self.state.set_playback_state(PlaybackState::Paused).await;
            }
            SinkEventKind::Progress { position, duration } => {
                if self.stall_deadline.is_some() && self.last_progress != Some(position) {
                    self.stall_deadline = None;
                }
                self.last_progress = Some(position);
                let position_ms = position.as_millis() as u64;
                let duration_ms = duration.map(|d| d.as_millis() as u64);
                self.state.update_position(position_ms, duration_ms).await;
                self.state.bus.emit_lossy(PlayerEvent::progress(
                    position_ms,
                    duration_ms.unwrap_or(0),
                ));
            }
            SinkEventKind::NearEnd => {
                // Last chance to have the next track decoded before the end.
                self.refresh_preload().await;
                if self.crossfade_ready().await {
                    debug!("Crossfading into the preloaded track");
                    if let Some(id) = self.current_id() {
                        self.state
                            .bus
                            .emit_lossy(PlayerEvent::track_ended(id.to_string()));
                    }
                    self.step(Step::Next, false).await;
                }
            }
            SinkEventKind::Ended => {
                if let Some(id) = self.current_id() {
                    self.state
                        .bus
                        .emit_lossy(PlayerEvent::track_ended(id.to_string()));
                }
                self.step(Step::Next, false).await;
            }
            SinkEventKind::Waiting => {
                // Position stopped moving with the sink still playing.
                // Hand it to the load watchdog; movement disarms it.
                warn!("Playback stalled");
                self.arm_stall_timer().await;
            }
            SinkEventKind::Error(message) => {
                match self.current_id().map(String::from) {
                    Some(id) => self.playback_failed(&id, &message).await,
                    None => self
                        .state
                        .bus
                        .emit_lossy(PlayerEvent::playback_error(None, message, false)),
                }
            }
            SinkEventKind::LoadStarted | SinkEventKind::Loaded => {}
        }
    }

    /// True when the natural end of the current track should be a crossfade
    /// into the standby slot rather than a wait for `Ended`.
    async fn crossfade_ready(&mut self) -> bool {
        if self.state.settings().await.crossfade_ms == 0 {
            return false;
        }
        if self.engine.standby_state() != SlotState::Ready {
            return false;
        }
        let Some(ticket) = &self.preload else {
            return false;
        };
        let ticket_id = ticket.track.id.clone();
        self.queue.peek_next().map(|t| t.id) == Some(ticket_id)
    }

    /// Resolution or sink failure for the current track: report it and,
    /// when enabled, schedule the automatic skip.
    async fn playback_failed(&mut self, track_id: &str, message: &str) {
        if self.failed_track.as_deref() == Some(track_id) {
            debug!("Failure for {track_id} already reported");
            return;
        }
        self.failed_track = Some(track_id.to_string());
        error!("Playback failed for {track_id}: {message}");
        self.stall_deadline = None;
        let settings = self.state.settings().await;
        let will_auto_skip = settings.auto_skip_on_error;
        self.state.bus.emit_lossy(PlayerEvent::playback_error(
            Some(track_id.to_string()),
            message,
            will_auto_skip,
        ));
        self.state.set_playback_state(PlaybackState::Paused).await;
        if will_auto_skip {
            self.auto_skip_deadline =
                Some(Instant::now() + Duration::from_millis(settings.auto_skip_delay_ms));
        }
    }

    async fn on_load_stalled(&mut self) {
        let Some(track_id) = self.current_id().map(String::from) else {
            return;
        };
        self.pipeline.cancel_active().await;
        self.playback_failed(&track_id, "loading timed out").await;
    }

    async fn arm_stall_timer(&mut self) {
        let timeout = self.state.settings().await.load_stall_timeout_ms;
        self.stall_deadline = Some(Instant::now() + Duration::from_millis(timeout));
    }
}

/// Sleeps until the deadline, or forever when there is none. Rebuilt every
/// loop turn, so clearing the deadline disarms the branch.
async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
