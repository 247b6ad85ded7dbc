//! Public event surface
//!
//! All externally observable playback activity is broadcast as [`PlayerEvent`]
//! values through an [`EventBus`]. Events serialize with a `type` tag so SSE
//! consumers can route on the event name without inspecting the payload.
//!
//! Sink-level events (per-slot load/play/end notifications inside the engine)
//! are a separate, internal channel; see `engine::sink`. The near-end signal
//! in particular never appears on this bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::queue::PlayMode;
use crate::track::Track;

/// Coarse playback state as consumers see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Stage of an active (non-preload) URL resolution, for UI feedback.
///
/// `Display` supplies the English status line; localization is the
/// consumer's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ResolvePhase {
    /// Asking the source plugin for a playable URL
    GettingUrl,
    /// Rate-limited; waiting before the single retry
    RetryWait { seconds: u64 },
    /// Trying the user-selected alternate source identity
    ToggleSource { source: String },
}

impl fmt::Display for ResolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvePhase::GettingUrl => f.write_str("Getting playback URL..."),
            ResolvePhase::RetryWait { seconds } => {
                write!(f, "Source busy, retrying in {}s...", seconds)
            }
            ResolvePhase::ToggleSource { source } => {
                write!(f, "Trying source {}...", source)
            }
        }
    }
}

/// Why the temp queue contents changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeTrigger {
    Enqueued,
    Consumed,
    Cleared,
}

/// Player events broadcast to UI and other collaborators.
///
/// Serialized for SSE transmission; the `type` tag is the SSE event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state changed (playing / paused / stopped)
    StateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// A different track became current
    TrackChanged {
        track: Track,
        /// List the track came from; `None` for temp-queue entries
        list_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Periodic position report for the active track
    Progress {
        position_ms: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The active track reached its natural end
    TrackEnded {
        track_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Active-playback failure (resolution or sink level)
    PlaybackError {
        track_id: Option<String>,
        message: String,
        /// True when an automatic skip to the next track is scheduled
        will_auto_skip: bool,
        timestamp: DateTime<Utc>,
    },

    /// Progress of an active URL resolution
    ResolveStatus {
        track_id: String,
        status: ResolvePhase,
        timestamp: DateTime<Utc>,
    },

    /// Play mode changed
    PlayModeChanged {
        old_mode: PlayMode,
        new_mode: PlayMode,
        timestamp: DateTime<Utc>,
    },

    /// Master volume changed
    VolumeChanged {
        old_volume: f32,
        new_volume: f32,
        timestamp: DateTime<Utc>,
    },

    /// Temp play queue changed
    QueueChanged {
        /// Entry ids now waiting in the temp queue, in play order
        temp_entries: Vec<Uuid>,
        trigger: QueueChangeTrigger,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    pub fn state_changed(old_state: PlaybackState, new_state: PlaybackState) -> Self {
        PlayerEvent::StateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        }
    }

    pub fn track_changed(track: Track, list_id: Option<String>) -> Self {
        PlayerEvent::TrackChanged {
            track,
            list_id,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(position_ms: u64, duration_ms: u64) -> Self {
        PlayerEvent::Progress {
            position_ms,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn track_ended(track_id: impl Into<String>) -> Self {
        PlayerEvent::TrackEnded {
            track_id: track_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn playback_error(
        track_id: Option<String>,
        message: impl Into<String>,
        will_auto_skip: bool,
    ) -> Self {
        PlayerEvent::PlaybackError {
            track_id,
            message: message.into(),
            will_auto_skip,
            timestamp: Utc::now(),
        }
    }

    pub fn resolve_status(track_id: impl Into<String>, status: ResolvePhase) -> Self {
        PlayerEvent::ResolveStatus {
            track_id: track_id.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn play_mode_changed(old_mode: PlayMode, new_mode: PlayMode) -> Self {
        PlayerEvent::PlayModeChanged {
            old_mode,
            new_mode,
            timestamp: Utc::now(),
        }
    }

    pub fn volume_changed(old_volume: f32, new_volume: f32) -> Self {
        PlayerEvent::VolumeChanged {
            old_volume,
            new_volume,
            timestamp: Utc::now(),
        }
    }

    pub fn queue_changed(temp_entries: Vec<Uuid>, trigger: QueueChangeTrigger) -> Self {
        PlayerEvent::QueueChanged {
            temp_entries,
            trigger,
            timestamp: Utc::now(),
        }
    }

    /// SSE event name for this event.
    pub fn type_name(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::TrackChanged { .. } => "TrackChanged",
            PlayerEvent::Progress { .. } => "Progress",
            PlayerEvent::TrackEnded { .. } => "TrackEnded",
            PlayerEvent::PlaybackError { .. } => "PlaybackError",
            PlayerEvent::ResolveStatus { .. } => "ResolveStatus",
            PlayerEvent::PlayModeChanged { .. } => "PlayModeChanged",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
        }
    }
}

/// Broadcast bus carrying [`PlayerEvent`]s to all subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    ///
    /// Slow subscribers that fall more than `capacity` events behind see a
    /// lagged error and miss the overwritten events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where no subscribers are listening.
    ///
    /// Used for periodic events (progress reports) where a silent bus is
    /// normal, not an error.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(PlayerEvent::StateChanged {
            old_state: PlaybackState::Stopped,
            new_state: PlaybackState::Playing,
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            PlayerEvent::StateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, PlaybackState::Stopped);
                assert_eq!(new_state, PlaybackState::Playing);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);

        let event = PlayerEvent::Progress {
            position_ms: 1000,
            duration_ms: 180_000,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy emit swallows the absence of subscribers
        bus.emit_lossy(event);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlayerEvent::Progress {
            position_ms: 5000,
            duration_ms: 200_000,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Progress\""));
        assert_eq!(event.type_name(), "Progress");
    }

    #[test]
    fn test_resolve_phase_display() {
        assert_eq!(
            ResolvePhase::RetryWait { seconds: 4 }.to_string(),
            "Source busy, retrying in 4s..."
        );
        assert_eq!(
            ResolvePhase::ToggleSource {
                source: "mirror".to_string()
            }
            .to_string(),
            "Trying source mirror..."
        );
    }

    #[test]
    fn test_playback_state_serde() {
        assert_eq!(
            serde_json::to_string(&PlaybackState::Playing).unwrap(),
            "\"playing\""
        );
        let state: PlaybackState = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(state, PlaybackState::Stopped);
    }
}
