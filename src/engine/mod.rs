//! Dual-slot audio engine.
//!
//! Two identical sinks alternate roles: one is the active slot the listener
//! hears, the other preloads the next track muted and paused at position
//! zero. `switch_to_ready` flips the roles and crossfades between them, so
//! a track boundary costs no load time. A monitor task polls the active
//! slot and reports progress, near-end and natural end over the engine's
//! event channel.

pub mod crossfade;
pub mod sink;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{Error, Result};

pub use crossfade::FadeCurve;
pub use sink::{MediaSink, SinkEvent, SinkEventKind, SlotId, SlotState};

use crossfade::FADE_STEPS;

/// How often the monitor samples the active slot.
const MONITOR_INTERVAL_MS: u64 = 200;

struct Slot {
    sink: Arc<dyn MediaSink>,
    state: SlotState,
    url: Option<String>,
    /// Crossfade gain for this slot, before master volume is applied.
    fade_gain: f32,
    near_end_fired: bool,
    ended_fired: bool,
    waiting_fired: bool,
    last_position: Option<Duration>,
}

impl Slot {
    fn new(sink: Arc<dyn MediaSink>) -> Self {
        Slot {
            sink,
            state: SlotState::Idle,
            url: None,
            fade_gain: 1.0,
            near_end_fired: false,
            ended_fired: false,
            waiting_fired: false,
            last_position: None,
        }
    }

    /// Assign a new source to this slot, resetting its one-shot flags.
    fn arm(&mut self, url: &str, state: SlotState) {
        self.state = state;
        self.url = Some(url.to_string());
        self.near_end_fired = false;
        self.ended_fired = false;
        self.waiting_fired = false;
        self.last_position = None;
    }

    fn clear(&mut self) {
        self.state = SlotState::Idle;
        self.url = None;
        self.fade_gain = 1.0;
        self.near_end_fired = false;
        self.ended_fired = false;
        self.waiting_fired = false;
        self.last_position = None;
    }
}

struct EngineInner {
    slots: [Slot; 2],
    active: SlotId,
    master_volume: f32,
    fade_curve: FadeCurve,
    /// Bumped by every cold start, switch or stop. An async step that
    /// captured an older value must yield without touching the slots.
    session_generation: u64,
    /// Bumped by every preload and by anything that invalidates one.
    preload_generation: u64,
    /// Generation of the fade currently in flight, if any.
    fade_session: Option<u64>,
}

impl EngineInner {
    fn fading_slot(&self) -> Option<SlotId> {
        [SlotId::A, SlotId::B]
            .into_iter()
            .find(|id| self.slots[id.index()].state == SlotState::FadingOut)
    }
}

/// The dual-slot playback engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct AudioEngine {
    inner: Arc<Mutex<EngineInner>>,
    events: mpsc::UnboundedSender<SinkEvent>,
    crossfade_ms: Arc<AtomicU64>,
    near_end_ms: Arc<AtomicU64>,
}

impl AudioEngine {
    /// Build an engine over two sinks. The returned receiver carries every
    /// [`SinkEvent`] the engine and its monitor produce.
    pub fn new(
        sink_a: Arc<dyn MediaSink>,
        sink_b: Arc<dyn MediaSink>,
        settings: &Settings,
    ) -> (AudioEngine, mpsc::UnboundedReceiver<SinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let inner = EngineInner {
            slots: [Slot::new(sink_a), Slot::new(sink_b)],
            active: SlotId::A,
            master_volume: settings.volume.clamp(0.0, 1.0),
            fade_curve: settings.crossfade_curve,
            session_generation: 0,
            preload_generation: 0,
            fade_session: None,
        };
        let engine = AudioEngine {
            inner: Arc::new(Mutex::new(inner)),
            events,
            crossfade_ms: Arc::new(AtomicU64::new(settings.crossfade_ms)),
            near_end_ms: Arc::new(AtomicU64::new(settings.near_end_ms.max(1))),
        };
        (engine, events_rx)
    }

    /// Start the periodic task that watches the active slot.
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(MONITOR_INTERVAL_MS));
            loop {
                ticker.tick().await;
                engine.monitor_tick();
            }
        })
    }

    /// Load `url` into the standby slot, muted and paused at position zero.
    ///
    /// A newer preload, cold start or stop supersedes this one; the
    /// superseded call returns `Ok(())` without marking anything ready.
    pub async fn preload(&self, url: &str) -> Result<()> {
        let (slot_id, generation, sink) = {
            let mut inner = self.inner.lock().unwrap();
            let slot_id = inner.active.other();
            if inner.slots[slot_id.index()].state == SlotState::FadingOut {
                return Err(Error::InvalidState(format!(
                    "slot {slot_id} is still fading out"
                )));
            }
            inner.preload_generation += 1;
            let generation = inner.preload_generation;
            let slot = &mut inner.slots[slot_id.index()];
            slot.arm(url, SlotState::Preloading);
            (slot_id, generation, slot.sink.clone())
        };
        debug!("Preloading into slot {slot_id}: {url}");
        sink.set_gain(0.0);
        self.send(slot_id, SinkEventKind::LoadStarted);
        match sink.load(url).await {
            Ok(()) => {
                {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.preload_generation != generation {
                        debug!("Preload of {url} superseded, discarding");
                        return Ok(());
                    }
                    let slot = &mut inner.slots[slot_id.index()];
                    if slot.state == SlotState::Preloading {
                        slot.state = SlotState::Ready;
                    }
                }
                debug!("Slot {slot_id} ready: {url}");
                self.send(slot_id, SinkEventKind::Loaded);
                Ok(())
            }
            Err(e) => {
                {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.preload_generation == generation {
                        inner.slots[slot_id.index()].clear();
                    }
                }
                self.send(slot_id, SinkEventKind::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Flip the active role to the standby slot if it is ready.
    ///
    /// Returns `Ok(false)` when the standby slot holds nothing playable, in
    /// which case nothing changes and the caller should fall back to a cold
    /// start. A switch issued while a previous fade is still running cancels
    /// that fade and silences its outgoing slot immediately, so no more than
    /// two sinks are ever audible.
    pub async fn switch_to_ready(&self) -> Result<bool> {
        let crossfade_ms = self.crossfade_ms.load(Ordering::Relaxed);
        let (prep, cancelled_sink) = {
            let mut inner = self.inner.lock().unwrap();
            let mut cancelled_sink = None;
            if inner.fade_session.take().is_some() {
                inner.session_generation += 1;
                let master = inner.master_volume;
                if let Some(fading) = inner.fading_slot() {
                    let slot = &mut inner.slots[fading.index()];
                    slot.sink.set_gain(0.0);
                    cancelled_sink = Some(slot.sink.clone());
                    slot.clear();
                }
                let active = inner.active;
                let slot = &mut inner.slots[active.index()];
                slot.fade_gain = 1.0;
                slot.sink.set_gain(master);
            }
            let standby_id = inner.active.other();
            if inner.slots[standby_id.index()].state != SlotState::Ready {
                (None, cancelled_sink)
            } else {
                inner.session_generation += 1;
                let generation = inner.session_generation;
                let outgoing_id = inner.active;
                let incoming = inner.slots[standby_id.index()].sink.clone();
                (
                    Some((generation, standby_id, incoming, outgoing_id)),
                    cancelled_sink,
                )
            }
        };
        if let Some(sink) = cancelled_sink {
            if let Err(e) = sink.stop().await {
                warn!("Failed to reset cancelled fade sink: {e}");
            }
        }
        let Some((generation, incoming_id, incoming_sink, outgoing_id)) = prep else {
            return Ok(false);
        };
        // The preload contract guarantees the sink is paused at position
        // zero, so this starts the new track from the top.
        incoming_sink.set_gain(0.0);
        incoming_sink.play().await?;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.session_generation != generation {
                return Ok(false);
            }
            inner.active = incoming_id;
            let slot = &mut inner.slots[incoming_id.index()];
            slot.state = SlotState::Active;
            slot.fade_gain = 0.0;
            let outgoing = &mut inner.slots[outgoing_id.index()];
            outgoing.state = SlotState::FadingOut;
            outgoing.fade_gain = 1.0;
            inner.fade_session = Some(generation);
        }
        debug!("Switched active slot to {incoming_id}, fading out {outgoing_id} over {crossfade_ms}ms");
        self.send(incoming_id, SinkEventKind::Playing);
        if crossfade_ms == 0 {
            self.finish_fade(generation, outgoing_id, incoming_id).await;
        } else {
            self.spawn_fade(generation, incoming_id, outgoing_id, crossfade_ms);
        }
        Ok(true)
    }

    /// Cold start: stop whatever is playing, load `url` into the active
    /// slot and play it at master volume. Clears any standby preload.
    pub async fn start(&self, url: &str) -> Result<()> {
        let (active_id, generation, active_sink, standby_sink, master) = {
            let mut inner = self.inner.lock().unwrap();
            inner.session_generation += 1;
            inner.preload_generation += 1;
            inner.fade_session = None;
            let generation = inner.session_generation;
            let active_id = inner.active;
            let standby_id = active_id.other();
            inner.slots[standby_id.index()].clear();
            let slot = &mut inner.slots[active_id.index()];
            slot.arm(url, SlotState::Preloading);
            slot.fade_gain = 1.0;
            let active_sink = slot.sink.clone();
            let standby_sink = inner.slots[standby_id.index()].sink.clone();
            (active_id, generation, active_sink, standby_sink, inner.master_volume)
        };
        debug!("Cold start on slot {active_id}: {url}");
        if let Err(e) = standby_sink.stop().await {
            warn!("Failed to clear standby sink: {e}");
        }
        standby_sink.set_gain(0.0);
        self.send(active_id, SinkEventKind::LoadStarted);
        let started = async {
            active_sink.stop().await?;
            active_sink.load(url).await?;
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = started {
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.session_generation == generation {
                    inner.slots[active_id.index()].clear();
                }
            }
            self.send(active_id, SinkEventKind::Error(e.to_string()));
            return Err(e);
        }
        {
            let inner = self.inner.lock().unwrap();
            if inner.session_generation != generation {
                debug!("Cold start of {url} superseded, discarding");
                return Ok(());
            }
        }
        active_sink.set_gain(master);
        active_sink.play().await?;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.session_generation == generation {
                inner.slots[active_id.index()].state = SlotState::Active;
            }
        }
        self.send(active_id, SinkEventKind::Playing);
        Ok(())
    }

    /// Drop whatever the standby slot holds. No-op while it is fading out.
    pub async fn clear_standby(&self) {
        let sink = {
            let mut inner = self.inner.lock().unwrap();
            inner.preload_generation += 1;
            let slot_id = inner.active.other();
            let slot = &mut inner.slots[slot_id.index()];
            if slot.state == SlotState::FadingOut {
                return;
            }
            slot.clear();
            slot.sink.clone()
        };
        if let Err(e) = sink.stop().await {
            warn!("Failed to clear standby sink: {e}");
        }
    }

    /// Pause the active slot. A pause that lands mid-fade snaps the fade to
    /// its end first so the outgoing slot cannot keep playing underneath.
    pub async fn pause(&self) -> Result<()> {
        let snap = {
            let inner = self.inner.lock().unwrap();
            inner
                .fade_session
                .and_then(|generation| inner.fading_slot().map(|out| (generation, out, inner.active)))
        };
        if let Some((generation, outgoing_id, incoming_id)) = snap {
            self.finish_fade(generation, outgoing_id, incoming_id).await;
        }
        let (slot_id, sink) = self.active_sink();
        sink.pause().await?;
        if sink.has_source() {
            self.send(slot_id, SinkEventKind::Paused);
        }
        Ok(())
    }

    /// Resume the active slot from its current position.
    pub async fn resume(&self) -> Result<()> {
        let (slot_id, sink) = self.active_sink();
        if !sink.has_source() {
            return Err(Error::InvalidState("no source loaded".into()));
        }
        sink.play().await?;
        self.send(slot_id, SinkEventKind::Playing);
        Ok(())
    }

    /// Stop both slots and clear their sources.
    pub async fn stop_all(&self) {
        let sinks = {
            let mut inner = self.inner.lock().unwrap();
            inner.session_generation += 1;
            inner.preload_generation += 1;
            inner.fade_session = None;
            let mut sinks = Vec::with_capacity(2);
            for slot in inner.slots.iter_mut() {
                slot.clear();
                sinks.push(slot.sink.clone());
            }
            sinks
        };
        debug!("Stopping both slots");
        for sink in sinks {
            if let Err(e) = sink.stop().await {
                warn!("Failed to stop sink: {e}");
            }
        }
    }

    /// Seek the active slot. The near-end flag stays latched, so seeking
    /// back out of the final stretch does not re-arm the notification.
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let (_, sink) = self.active_sink();
        if !sink.has_source() {
            return Err(Error::InvalidState("no source loaded".into()));
        }
        sink.seek(position).await
    }

    /// Set master volume. Crossfade gains ride on top of this.
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let mut inner = self.inner.lock().unwrap();
        inner.master_volume = volume;
        for slot in inner.slots.iter() {
            if matches!(slot.state, SlotState::Active | SlotState::FadingOut) {
                slot.sink.set_gain(slot.fade_gain * volume);
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().unwrap().master_volume
    }

    pub fn position(&self) -> Option<Duration> {
        self.active_sink().1.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.active_sink().1.duration()
    }

    pub fn active_slot(&self) -> SlotId {
        self.inner.lock().unwrap().active
    }

    pub fn standby_state(&self) -> SlotState {
        let inner = self.inner.lock().unwrap();
        inner.slots[inner.active.other().index()].state
    }

    pub fn active_has_source(&self) -> bool {
        self.active_sink().1.has_source()
    }

    /// Update crossfade length and near-end threshold from settings.
    pub fn set_timing(&self, crossfade_ms: u64, near_end_ms: u64) {
        self.crossfade_ms.store(crossfade_ms, Ordering::Relaxed);
        self.near_end_ms.store(near_end_ms.max(1), Ordering::Relaxed);
    }

    pub fn set_fade_curve(&self, curve: FadeCurve) {
        self.inner.lock().unwrap().fade_curve = curve;
    }

    fn active_sink(&self) -> (SlotId, Arc<dyn MediaSink>) {
        let inner = self.inner.lock().unwrap();
        (inner.active, inner.slots[inner.active.index()].sink.clone())
    }

    fn spawn_fade(&self, generation: u64, incoming_id: SlotId, outgoing_id: SlotId, crossfade_ms: u64) {
        let engine = self.clone();
        tokio::spawn(async move {
            let step_interval =
                Duration::from_millis((crossfade_ms / u64::from(FADE_STEPS)).max(1));
            for step in 1..=FADE_STEPS {
                tokio::time::sleep(step_interval).await;
                let t = step as f32 / FADE_STEPS as f32;
                {
                    let mut inner = engine.inner.lock().unwrap();
                    if inner.fade_session != Some(generation) {
                        return;
                    }
                    let master = inner.master_volume;
                    let curve = inner.fade_curve;
                    let fade_in = curve.fade_in(t);
                    let fade_out = curve.fade_out(t);
                    let slot = &mut inner.slots[incoming_id.index()];
                    slot.fade_gain = fade_in;
                    slot.sink.set_gain(fade_in * master);
                    let slot = &mut inner.slots[outgoing_id.index()];
                    slot.fade_gain = fade_out;
                    slot.sink.set_gain(fade_out * master);
                }
            }
            engine.finish_fade(generation, outgoing_id, incoming_id).await;
        });
    }

    /// Complete a fade: incoming at full gain, outgoing stopped, cleared
    /// and its gain restored for reuse.
    async fn finish_fade(&self, generation: u64, outgoing_id: SlotId, incoming_id: SlotId) {
        let (sink, master) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.fade_session != Some(generation) {
                return;
            }
            inner.fade_session = None;
            let master = inner.master_volume;
            let slot = &mut inner.slots[incoming_id.index()];
            slot.fade_gain = 1.0;
            slot.sink.set_gain(master);
            let slot = &mut inner.slots[outgoing_id.index()];
            slot.sink.set_gain(0.0);
            slot.clear();
            (slot.sink.clone(), master)
        };
        debug!("Fade complete, slot {outgoing_id} released");
        if let Err(e) = sink.stop().await {
            warn!("Failed to reset faded-out sink: {e}");
        }
        sink.set_gain(master);
    }

    /// One monitor pass over the active slot.
    fn monitor_tick(&self) {
        let mut events = Vec::new();
        {
            let near_end = Duration::from_millis(self.near_end_ms.load(Ordering::Relaxed));
            let mut inner = self.inner.lock().unwrap();
            let active_id = inner.active;
            let slot = &mut inner.slots[active_id.index()];
            if slot.state != SlotState::Active || !slot.sink.has_source() {
                return;
            }
            let Some(position) = slot.sink.position() else {
                return;
            };
            let duration = slot.sink.duration();
            events.push(SinkEvent {
                slot: active_id,
                kind: SinkEventKind::Progress { position, duration },
            });
            if slot.sink.is_playing() {
                if slot.last_position == Some(position) {
                    if !slot.waiting_fired {
                        slot.waiting_fired = true;
                        events.push(SinkEvent {
                            slot: active_id,
                            kind: SinkEventKind::Waiting,
                        });
                    }
                } else {
                    slot.waiting_fired = false;
                }
            }
            slot.last_position = Some(position);
            if let Some(total) = duration {
                if total > Duration::ZERO {
                    if !slot.near_end_fired && total.saturating_sub(position) <= near_end {
                        slot.near_end_fired = true;
                        events.push(SinkEvent {
                            slot: active_id,
                            kind: SinkEventKind::NearEnd,
                        });
                    }
                    if !slot.ended_fired && position >= total {
                        slot.ended_fired = true;
                        events.push(SinkEvent {
                            slot: active_id,
                            kind: SinkEventKind::Ended,
                        });
                    }
                }
            }
        }
        for event in events {
            self.send_event(event);
        }
    }

    fn send(&self, slot: SlotId, kind: SinkEventKind) {
        self.send_event(SinkEvent { slot, kind });
    }

    fn send_event(&self, event: SinkEvent) {
        // Receiver gone means we are shutting down.
        let _ = self.events.send(event);
    }
}
