//! Shared playback state.
//!
//! Read-mostly state shared between the orchestrator and the API surface.
//! The orchestrator is the only writer; handlers read snapshots and send
//! commands instead of mutating anything here.

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::config::Settings;
use crate::events::{EventBus, PlaybackState, PlayerEvent};
use crate::queue::{PlayMode, TempEntry};
use crate::track::Track;

/// Snapshot of the current track for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub track: Track,
    pub list_id: Option<String>,
    pub is_temp: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
}

/// Queue snapshot mirrored out of the orchestrator after each mutation,
/// so `GET /queue` never has to ask the command loop anything.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    pub mode: PlayMode,
    pub list_id: Option<String>,
    pub list_len: usize,
    pub temp: Vec<TempEntry>,
}

/// State shared between components.
pub struct SharedState {
    pub playback_state: RwLock<PlaybackState>,
    pub now_playing: RwLock<Option<NowPlaying>>,
    pub queue: RwLock<QueueSnapshot>,
    pub settings: RwLock<Settings>,
    pub bus: EventBus,
}

impl SharedState {
    pub fn new(settings: Settings) -> Self {
        Self {
            playback_state: RwLock::new(PlaybackState::Stopped),
            now_playing: RwLock::new(None),
            queue: RwLock::new(QueueSnapshot::default()),
            settings: RwLock::new(settings),
            bus: EventBus::new(256),
        }
    }

    pub async fn playback_state(&self) -> PlaybackState {
        *self.playback_state.read().await
    }

    /// Transition the playback state, emitting `StateChanged` when it
    /// actually changes.
    pub async fn set_playback_state(&self, new_state: PlaybackState) {
        let old_state = {
            let mut guard = self.playback_state.write().await;
            let old = *guard;
            *guard = new_state;
            old
        };
        if old_state != new_state {
            self.bus
                .emit_lossy(PlayerEvent::state_changed(old_state, new_state));
        }
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.read().await.clone()
    }

    pub async fn set_now_playing(&self, now: Option<NowPlaying>) {
        *self.now_playing.write().await = now;
    }

    /// Update position/duration of the current track, if any.
    pub async fn update_position(&self, position_ms: u64, duration_ms: Option<u64>) {
        if let Some(now) = self.now_playing.write().await.as_mut() {
            now.position_ms = position_ms;
            if duration_ms.is_some() {
                now.duration_ms = duration_ms;
            }
        }
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Apply a settings change. The orchestrator is the only caller.
    pub async fn update_settings(&self, apply: impl FnOnce(&mut Settings)) {
        apply(&mut *self.settings.write().await);
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.read().await.clone()
    }

    pub async fn set_queue_snapshot(&self, snapshot: QueueSnapshot) {
        *self.queue.write().await = snapshot;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.bus.subscribe()
    }
}

/// Convenience constructor used by tests and the current-track snapshot.
impl NowPlaying {
    pub fn starting(track: Track, list_id: Option<String>, is_temp: bool) -> Self {
        let duration_ms = track.duration_ms;
        Self {
            track,
            list_id,
            is_temp,
            position_ms: 0,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_change_emits_once() {
        let state = SharedState::new(Settings::default());
        let mut rx = state.subscribe();

        state.set_playback_state(PlaybackState::Playing).await;
        // Same state again must not emit.
        state.set_playback_state(PlaybackState::Playing).await;
        state.set_playback_state(PlaybackState::Paused).await;

        match rx.try_recv().unwrap() {
            PlayerEvent::StateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, PlaybackState::Stopped);
                assert_eq!(new_state, PlaybackState::Playing);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            PlayerEvent::StateChanged { new_state, .. } => {
                assert_eq!(new_state, PlaybackState::Paused);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_position_updates_apply_to_current_track() {
        let state = SharedState::new(Settings::default());
        state.update_position(1000, None).await;
        assert!(state.now_playing().await.is_none());

        let track = Track {
            id: "t1".into(),
            source: "local".into(),
            name: "T1".into(),
            artist: "tester".into(),
            album: None,
            duration_ms: None,
            available: Default::default(),
            toggle: None,
        };
        state
            .set_now_playing(Some(NowPlaying::starting(track, None, false)))
            .await;
        state.update_position(1500, Some(180_000)).await;
        let now = state.now_playing().await.unwrap();
        assert_eq!(now.position_ms, 1500);
        assert_eq!(now.duration_ms, Some(180_000));
    }
}
