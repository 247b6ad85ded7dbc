//! Play queue state: active list, temp play queue, played history, and the
//! play-mode policy that governs how playback advances.
//!
//! The queue itself never touches audio. The orchestrator asks the traversal
//! layer (`resolver`) for the next or previous track and feeds the result to
//! the engine; everything here is plain state plus the bookkeeping rules for
//! it (history dedup, cache invalidation, temp-queue precedence).

pub mod resolver;

pub use resolver::Advance;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::track::{ListId, Track};

/// Policy for automatic and manual track advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayMode {
    /// Play the list front to back, then stop.
    SequentialStop,
    /// Play the list front to back, wrapping at the ends.
    #[default]
    ListLoop,
    /// Replay the current track on auto-advance.
    SingleLoop,
    /// Pick uniformly among tracks not yet played this cycle.
    Random,
}

impl PlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayMode::SequentialStop => "sequential-stop",
            PlayMode::ListLoop => "list-loop",
            PlayMode::SingleLoop => "single-loop",
            PlayMode::Random => "random",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential-stop" => Ok(PlayMode::SequentialStop),
            "list-loop" => Ok(PlayMode::ListLoop),
            "single-loop" => Ok(PlayMode::SingleLoop),
            "random" => Ok(PlayMode::Random),
            other => Err(Error::Config(format!("unknown play mode: {other}"))),
        }
    }
}

/// One entry in the temp play queue.
///
/// Entries get a fresh id at enqueue time so the queue can hold the same
/// track twice and events can still name a specific entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempEntry {
    pub id: Uuid,
    pub track: Track,
}

/// A played-history record. Only written under random mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub track: Track,
    pub list_id: ListId,
}

/// What is playing right now (or paused/stopped on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTrack {
    pub track: Track,
    /// Source list, `None` for temp-queue entries.
    pub list_id: Option<ListId>,
    pub is_temp: bool,
}

/// Candidate filter applied before mode arithmetic: given the active list,
/// the played history, and the anchor index, returns the tracks eligible for
/// selection. The default drops everything already in the history.
pub type CandidateFilter = fn(&[Track], &[HistoryEntry], usize) -> Vec<Track>;

pub fn default_candidate_filter(
    list: &[Track],
    history: &[HistoryEntry],
    _reference: usize,
) -> Vec<Track> {
    list.iter()
        .filter(|t| !history.iter().any(|h| h.track.id == t.id))
        .cloned()
        .collect()
}

/// Queue state for one playback session.
///
/// Reset rules: switching to a different list resets history, temp queue and
/// the random lookahead cache; jumping within the same list keeps them.
pub struct PlayQueue {
    mode: PlayMode,
    list: Vec<Track>,
    list_id: Option<ListId>,
    /// Anchor position in `list`. Stays put while a temp entry plays so the
    /// list can be resumed where it was interrupted.
    current_index: usize,
    current: Option<CurrentTrack>,
    temp: VecDeque<TempEntry>,
    history: Vec<HistoryEntry>,
    cached_random_next: Option<Track>,
    filter: CandidateFilter,
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::with_filter(default_candidate_filter)
    }

    pub fn with_filter(filter: CandidateFilter) -> Self {
        Self {
            mode: PlayMode::default(),
            list: Vec::new(),
            list_id: None,
            current_index: 0,
            current: None,
            temp: VecDeque::new(),
            history: Vec::new(),
            cached_random_next: None,
            filter,
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn current(&self) -> Option<&CurrentTrack> {
        self.current.as_ref()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref().map(|c| &c.track)
    }

    pub fn list_id(&self) -> Option<&str> {
        self.list_id.as_deref()
    }

    pub fn list_len(&self) -> usize {
        self.list.len()
    }

    pub fn temp_len(&self) -> usize {
        self.temp.len()
    }

    /// Ids of the pending temp entries, front first.
    pub fn temp_ids(&self) -> Vec<Uuid> {
        self.temp.iter().map(|e| e.id).collect()
    }

    /// Pending temp entries, front first.
    pub fn temp_entries(&self) -> Vec<TempEntry> {
        self.temp.iter().cloned().collect()
    }

    pub(crate) fn history_track_ids(&self) -> Vec<String> {
        self.history.iter().map(|h| h.track.id.clone()).collect()
    }

    /// Load a list and start playing the track at `index`.
    ///
    /// A different list id resets history, temp queue and the random cache.
    /// Jumping within the already-loaded list keeps them.
    pub fn play_from_list(
        &mut self,
        tracks: Vec<Track>,
        list_id: ListId,
        index: usize,
    ) -> Result<Track> {
        let Some(track) = tracks.get(index).cloned() else {
            return Err(Error::InvalidState(format!(
                "play index {index} out of range for list of {} tracks",
                tracks.len()
            )));
        };
        if self.list_id.as_deref() != Some(list_id.as_str()) {
            debug!("switching play list to {list_id}, resetting queue state");
            self.history.clear();
            self.temp.clear();
            self.cached_random_next = None;
        }
        self.list = tracks;
        self.list_id = Some(list_id);
        self.current_index = index;
        self.make_current(track.clone(), false);
        info!("playing {} from list at index {index}", track.id);
        Ok(track)
    }

    /// Append tracks to the temp play queue. With `play_next` they go to the
    /// front (in the given order) instead of the back. Returns the new entry
    /// ids.
    pub fn enqueue(&mut self, tracks: Vec<Track>, play_next: bool) -> Vec<Uuid> {
        let entries: Vec<TempEntry> = tracks
            .into_iter()
            .map(|track| TempEntry {
                id: Uuid::new_v4(),
                track,
            })
            .collect();
        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        if play_next {
            for entry in entries.into_iter().rev() {
                self.temp.push_front(entry);
            }
        } else {
            self.temp.extend(entries);
        }
        debug!("temp queue now holds {} entries", self.temp.len());
        ids
    }

    pub fn clear_temp(&mut self) {
        self.temp.clear();
    }

    /// Change the play mode. Returns false when the mode is unchanged.
    ///
    /// Mode changes wipe the played history; entering random mode seeds it
    /// with the current list track so it is not picked again immediately.
    pub fn set_mode(&mut self, mode: PlayMode) -> bool {
        if self.mode == mode {
            return false;
        }
        info!("play mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.history.clear();
        self.cached_random_next = None;
        if mode == PlayMode::Random {
            if let Some(track) = self
                .current
                .as_ref()
                .filter(|c| !c.is_temp)
                .map(|c| c.track.clone())
            {
                self.push_history(&track);
            }
        }
        true
    }

    /// Drop the current track, keeping the list and anchor position.
    pub fn clear_current(&mut self) {
        self.current = None;
        self.cached_random_next = None;
    }

    pub fn invalidate_random_cache(&mut self) {
        self.cached_random_next = None;
    }

    /// Install `track` as the current track, updating the anchor index, the
    /// random-mode history and the lookahead cache.
    pub(crate) fn make_current(&mut self, track: Track, is_temp: bool) {
        if !is_temp {
            if let Some(pos) = self.list.iter().position(|t| t.id == track.id) {
                self.current_index = pos;
            }
            if self.mode == PlayMode::Random {
                self.push_history(&track);
            }
        }
        self.current = Some(CurrentTrack {
            list_id: if is_temp { None } else { self.list_id.clone() },
            track,
            is_temp,
        });
        self.cached_random_next = None;
    }

    /// Record a track in the played history. Tracks already present keep
    /// their position, so walking the history with previous/next stays
    /// stable across replays.
    fn push_history(&mut self, track: &Track) {
        let Some(list_id) = self.list_id.clone() else {
            return;
        };
        if self.history.iter().any(|h| h.track.id == track.id) {
            return;
        }
        self.history.push(HistoryEntry {
            track: track.clone(),
            list_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Track;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            source: "local".to_string(),
            name: id.to_uppercase(),
            artist: "tester".to_string(),
            album: None,
            duration_ms: Some(180_000),
            available: Default::default(),
            toggle: None,
        }
    }

    fn three_tracks() -> Vec<Track> {
        vec![track("a"), track("b"), track("c")]
    }

    #[test]
    fn test_play_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&PlayMode::SequentialStop).unwrap(),
            "\"sequential-stop\""
        );
        assert_eq!(
            serde_json::from_str::<PlayMode>("\"list-loop\"").unwrap(),
            PlayMode::ListLoop
        );
        assert_eq!("single-loop".parse::<PlayMode>().unwrap(), PlayMode::SingleLoop);
        assert!("shuffle".parse::<PlayMode>().is_err());
    }

    #[test]
    fn test_play_from_list_rejects_bad_index() {
        let mut q = PlayQueue::new();
        assert!(q.play_from_list(Vec::new(), "l1".into(), 0).is_err());
        assert!(q.play_from_list(three_tracks(), "l1".into(), 3).is_err());
        assert!(q.current().is_none());
    }

    #[test]
    fn test_list_switch_resets_state_but_same_list_keeps_it() {
        let mut q = PlayQueue::new();
        q.set_mode(PlayMode::Random);
        q.play_from_list(three_tracks(), "l1".into(), 0).unwrap();
        q.enqueue(vec![track("x")], false);
        assert_eq!(q.temp_len(), 1);
        assert_eq!(q.history_track_ids(), vec!["a"]);

        // Same list: jump to another track, state survives.
        q.play_from_list(three_tracks(), "l1".into(), 1).unwrap();
        assert_eq!(q.temp_len(), 1);
        assert_eq!(q.history_track_ids(), vec!["a", "b"]);

        // Different list: everything resets.
        q.play_from_list(three_tracks(), "l2".into(), 0).unwrap();
        assert_eq!(q.temp_len(), 0);
        assert_eq!(q.history_track_ids(), vec!["a"]);
    }

    #[test]
    fn test_enqueue_orders_front_and_back() {
        let mut q = PlayQueue::new();
        q.enqueue(vec![track("a"), track("b")], false);
        q.enqueue(vec![track("x"), track("y")], true);
        let order: Vec<String> = q.temp.iter().map(|e| e.track.id.clone()).collect();
        assert_eq!(order, vec!["x", "y", "a", "b"]);
    }

    #[test]
    fn test_mode_change_seeds_history_for_random() {
        let mut q = PlayQueue::new();
        q.play_from_list(three_tracks(), "l1".into(), 1).unwrap();
        assert!(q.history_track_ids().is_empty());

        assert!(q.set_mode(PlayMode::Random));
        assert_eq!(q.history_track_ids(), vec!["b"]);

        // Leaving random wipes the history again.
        assert!(q.set_mode(PlayMode::ListLoop));
        assert!(q.history_track_ids().is_empty());

        // No-op change reports false.
        assert!(!q.set_mode(PlayMode::ListLoop));
    }

    #[test]
    fn test_history_keeps_position_on_replay() {
        let mut q = PlayQueue::new();
        q.set_mode(PlayMode::Random);
        q.play_from_list(three_tracks(), "l1".into(), 0).unwrap();
        q.make_current(track("b"), false);
        q.make_current(track("a"), false);
        assert_eq!(q.history_track_ids(), vec!["a", "b"]);
    }
}
