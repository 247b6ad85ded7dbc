//! The media sink seam and the tagged event stream both sinks share.
//!
//! The engine drives two interchangeable sinks through [`MediaSink`].
//! Production uses the decoded-buffer sink in `audio::`; tests use a
//! scripted mock. Every observation the engine makes about a sink travels
//! one channel as a [`SinkEvent`] tagged with the slot it concerns, so
//! consumers can discard activity from the slot that is merely preloading.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Identity of one of the two playback slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::A => f.write_str("A"),
            SlotId::B => f.write_str("B"),
        }
    }
}

/// Lifecycle state of a playback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Preloading,
    Ready,
    Active,
    FadingOut,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotState::Idle => "idle",
            SlotState::Preloading => "preloading",
            SlotState::Ready => "ready",
            SlotState::Active => "active",
            SlotState::FadingOut => "fading-out",
        };
        f.write_str(s)
    }
}

/// What happened on a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEventKind {
    LoadStarted,
    Loaded,
    Playing,
    Paused,
    /// The sink ran out of buffered data mid-track.
    Waiting,
    /// The active track played to its natural end.
    Ended,
    /// The active track will end within the configured threshold.
    NearEnd,
    /// Periodic position observation for the active slot.
    Progress {
        position: Duration,
        duration: Option<Duration>,
    },
    Error(String),
}

/// A sink observation tagged with the slot it came from.
///
/// Consumers must compare `slot` against the active slot; events from the
/// preloading slot are not playback-state transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEvent {
    pub slot: SlotId,
    pub kind: SinkEventKind,
}

/// One playback sink.
///
/// Contract notes:
/// - `load` leaves the sink paused at position zero with the source fully
///   decoded. Calling `load` again while a load is in flight supersedes it;
///   the most recent call wins regardless of completion order.
/// - `stop` clears the loaded source and resets the position.
/// - `set_gain` takes the final gain (crossfade gain and master volume
///   already combined) and must be callable from any thread without
///   blocking.
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn load(&self, url: &str) -> Result<()>;
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn seek(&self, position: Duration) -> Result<()>;
    fn set_gain(&self, gain: f32);
    fn gain(&self) -> f32;
    /// Current playback position; `None` when no source is loaded.
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn has_source(&self) -> bool;
    fn is_playing(&self) -> bool;
}
