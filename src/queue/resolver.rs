//! Next/previous traversal over the play queue.
//!
//! Both directions run the same machine: the temp queue head always wins,
//! then the played history is replayed (forward for next, backward for
//! previous, pruning entries whose track left the list), then the cached
//! random lookahead, and finally the play-mode arithmetic over the filtered
//! candidate list. A `Stop` outcome means the queue is exhausted; the
//! current track is cleared and the caller halts playback.

use rand::Rng;
use tracing::debug;

use super::{PlayMode, PlayQueue};
use crate::track::Track;

/// Outcome of an advance request.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Play this track now.
    Track(Track),
    /// Nothing left to play; the current track has been cleared.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Next,
    Previous,
}

impl PlayQueue {
    /// What auto-advance would play next, without changing any state other
    /// than filling the random lookahead cache and pruning dead history.
    ///
    /// Used to decide what to preload. A later [`PlayQueue::advance_next`]
    /// returns the same track as long as the queue is not mutated in
    /// between.
    pub fn peek_next(&mut self) -> Option<Track> {
        if let Some(entry) = self.temp.front() {
            return Some(entry.track.clone());
        }
        if let Some(track) = self.history_replay(Direction::Next) {
            return Some(track);
        }
        if self.mode == PlayMode::Random {
            if let Some(track) = &self.cached_random_next {
                return Some(track.clone());
            }
        }
        let target = self.mode_target(Direction::Next, self.mode)?;
        if self.mode == PlayMode::Random {
            self.cached_random_next = Some(target.clone());
        }
        Some(target)
    }

    /// Advance to the next track. `manual` marks user-triggered navigation,
    /// which coerces the stop-at-end and replay modes into list-loop so a
    /// skip always lands somewhere.
    pub fn advance_next(&mut self, manual: bool) -> Advance {
        self.advance(Direction::Next, manual)
    }

    /// Step back to the previous track. Same coercion rule as
    /// [`PlayQueue::advance_next`].
    pub fn advance_previous(&mut self, manual: bool) -> Advance {
        self.advance(Direction::Previous, manual)
    }

    fn advance(&mut self, dir: Direction, manual: bool) -> Advance {
        // Temp queue head wins in both directions, in every mode.
        if let Some(entry) = self.temp.pop_front() {
            debug!("advancing to temp entry {}", entry.track.id);
            self.make_current(entry.track.clone(), true);
            return Advance::Track(entry.track);
        }
        if let Some(track) = self.history_replay(dir) {
            debug!("replaying {} from history", track.id);
            self.make_current(track.clone(), false);
            return Advance::Track(track);
        }
        if dir == Direction::Next && self.mode == PlayMode::Random {
            if let Some(track) = self.cached_random_next.take() {
                self.make_current(track.clone(), false);
                return Advance::Track(track);
            }
        }
        match self.mode_target(dir, self.effective_mode(manual)) {
            Some(track) => {
                self.make_current(track.clone(), false);
                Advance::Track(track)
            }
            None => {
                debug!("queue exhausted, stopping");
                self.clear_current();
                Advance::Stop
            }
        }
    }

    fn effective_mode(&self, manual: bool) -> PlayMode {
        if manual && matches!(self.mode, PlayMode::SequentialStop | PlayMode::SingleLoop) {
            PlayMode::ListLoop
        } else {
            self.mode
        }
    }

    /// Walk the played history relative to the current track. Entries whose
    /// track no longer exists in the list are dropped as they are stepped
    /// over; the first survivor is the replay target.
    fn history_replay(&mut self, dir: Direction) -> Option<Track> {
        let current_id = match &self.current {
            Some(c) if !c.is_temp => c.track.id.clone(),
            _ => return None,
        };
        let k = self
            .history
            .iter()
            .position(|h| h.track.id == current_id)?;
        match dir {
            Direction::Next => {
                let mut i = k + 1;
                while i < self.history.len() {
                    if self.in_list(&self.history[i].track.id) {
                        return Some(self.history[i].track.clone());
                    }
                    self.history.remove(i);
                }
                None
            }
            Direction::Previous => {
                let mut i = k;
                while i > 0 {
                    i -= 1;
                    if self.in_list(&self.history[i].track.id) {
                        return Some(self.history[i].track.clone());
                    }
                    self.history.remove(i);
                }
                None
            }
        }
    }

    /// Steps 4 and 5: filter the list, locate the reference position and
    /// apply the mode transition. `None` is the stop signal.
    fn mode_target(&self, dir: Direction, mode: PlayMode) -> Option<Track> {
        if self.list.is_empty() {
            return None;
        }
        // Previous while a temp entry plays returns to the interrupted
        // list position rather than stepping past it.
        if dir == Direction::Previous && self.current.as_ref().is_some_and(|c| c.is_temp) {
            return self.list.get(self.current_index).cloned();
        }
        if mode == PlayMode::SingleLoop && dir == Direction::Next {
            if let Some(cur) = &self.current {
                return Some(cur.track.clone());
            }
        }
        let anchor = self.current_index.min(self.list.len() - 1);
        let filtered = (self.filter)(&self.list, &self.history, anchor);
        if filtered.is_empty() {
            return None;
        }
        let len = filtered.len();
        if mode == PlayMode::Random {
            let pick = rand::thread_rng().gen_range(0..len);
            return Some(filtered[pick].clone());
        }
        let pos = self
            .reference_track_id()
            .and_then(|id| filtered.iter().position(|t| t.id == id))
            .unwrap_or(0);
        let target = match dir {
            Direction::Next => {
                if mode == PlayMode::SequentialStop {
                    if pos + 1 >= len {
                        return None;
                    }
                    pos + 1
                } else {
                    (pos + 1) % len
                }
            }
            Direction::Previous => {
                if mode == PlayMode::SequentialStop {
                    if pos == 0 {
                        return None;
                    }
                    pos - 1
                } else {
                    (pos + len - 1) % len
                }
            }
        };
        Some(filtered[target].clone())
    }

    /// The track whose list position anchors the next/previous arithmetic:
    /// the current list track, or the track at the anchor index while a
    /// temp entry plays.
    fn reference_track_id(&self) -> Option<String> {
        match &self.current {
            Some(cur) if !cur.is_temp => Some(cur.track.id.clone()),
            _ => self.list.get(self.current_index).map(|t| t.id.clone()),
        }
    }

    fn in_list(&self, track_id: &str) -> bool {
        self.list.iter().any(|t| t.id == track_id)
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

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id)).collect()
    }

    fn playing(mode: PlayMode, ids: &[&str], index: usize) -> PlayQueue {
        let mut q = PlayQueue::new();
        q.set_mode(mode);
        q.play_from_list(tracks(ids), "l1".into(), index).unwrap();
        q
    }

    fn next_track(q: &mut PlayQueue, manual: bool) -> Track {
        match q.advance_next(manual) {
            Advance::Track(t) => t,
            Advance::Stop => panic!("queue stopped unexpectedly"),
        }
    }

    fn prev_track(q: &mut PlayQueue, manual: bool) -> Track {
        match q.advance_previous(manual) {
            Advance::Track(t) => t,
            Advance::Stop => panic!("queue stopped unexpectedly"),
        }
    }

    #[test]
    fn test_list_loop_wraps_forward() {
        let mut q = playing(PlayMode::ListLoop, &["a", "b", "c"], 1);
        assert_eq!(next_track(&mut q, false).id, "c");
        assert_eq!(next_track(&mut q, false).id, "a");
        assert_eq!(q.current_track().unwrap().id, "a");
    }

    #[test]
    fn test_list_loop_wraps_backward() {
        let mut q = playing(PlayMode::ListLoop, &["a", "b", "c"], 0);
        assert_eq!(prev_track(&mut q, false).id, "c");
        assert_eq!(prev_track(&mut q, false).id, "b");
    }

    #[test]
    fn test_sequential_stop_stops_at_end() {
        let mut q = playing(PlayMode::SequentialStop, &["a", "b", "c"], 2);
        assert_eq!(q.advance_next(false), Advance::Stop);
        assert!(q.current().is_none());
    }

    #[test]
    fn test_sequential_stop_manual_next_wraps() {
        let mut q = playing(PlayMode::SequentialStop, &["a", "b", "c"], 2);
        assert_eq!(next_track(&mut q, true).id, "a");
    }

    #[test]
    fn test_sequential_stop_previous_at_first() {
        let mut q = playing(PlayMode::SequentialStop, &["a", "b", "c"], 0);
        assert_eq!(q.advance_previous(false), Advance::Stop);

        let mut q = playing(PlayMode::SequentialStop, &["a", "b", "c"], 0);
        assert_eq!(prev_track(&mut q, true).id, "c");
    }

    #[test]
    fn test_single_loop_replays_on_auto_advance() {
        let mut q = playing(PlayMode::SingleLoop, &["a", "b", "c"], 1);
        assert_eq!(next_track(&mut q, false).id, "b");
        assert_eq!(next_track(&mut q, true).id, "c");
        assert_eq!(prev_track(&mut q, false).id, "b");
    }

    #[test]
    fn test_empty_list_stops_immediately() {
        let mut q = PlayQueue::new();
        assert_eq!(q.advance_next(false), Advance::Stop);
        assert_eq!(q.advance_previous(true), Advance::Stop);
        assert!(q.peek_next().is_none());
    }

    #[test]
    fn test_temp_queue_preempts_any_mode() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c"], 0);
        q.enqueue(vec![track("x")], false);
        let got = next_track(&mut q, false);
        assert_eq!(got.id, "x");
        assert!(q.current().unwrap().is_temp);
        assert_eq!(q.temp_len(), 0);
    }

    #[test]
    fn test_temp_queue_preempts_previous_too() {
        let mut q = playing(PlayMode::ListLoop, &["a", "b", "c"], 0);
        q.enqueue(vec![track("x")], false);
        assert_eq!(prev_track(&mut q, true).id, "x");
    }

    #[test]
    fn test_peek_does_not_consume_temp() {
        let mut q = playing(PlayMode::ListLoop, &["a", "b", "c"], 0);
        q.enqueue(vec![track("x")], false);
        assert_eq!(q.peek_next().unwrap().id, "x");
        assert_eq!(q.temp_len(), 1);
        assert_eq!(next_track(&mut q, false).id, "x");
        assert_eq!(q.temp_len(), 0);
    }

    #[test]
    fn test_next_after_temp_resumes_past_anchor() {
        let mut q = playing(PlayMode::ListLoop, &["a", "b", "c"], 1);
        q.enqueue(vec![track("x")], false);
        assert_eq!(next_track(&mut q, false).id, "x");
        assert_eq!(next_track(&mut q, false).id, "c");
        assert!(!q.current().unwrap().is_temp);
    }

    #[test]
    fn test_previous_from_temp_returns_to_interrupted_track() {
        let mut q = playing(PlayMode::ListLoop, &["a", "b", "c"], 1);
        q.enqueue(vec![track("x")], false);
        assert_eq!(next_track(&mut q, false).id, "x");
        let got = prev_track(&mut q, true);
        assert_eq!(got.id, "b");
        assert!(!q.current().unwrap().is_temp);
    }

    #[test]
    fn test_random_previous_walks_history() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c"], 0);
        let first = next_track(&mut q, false);
        let second = next_track(&mut q, false);
        assert_ne!(first.id, "a");
        assert_ne!(second.id, "a");
        assert_ne!(first.id, second.id);

        assert_eq!(prev_track(&mut q, true).id, first.id);
        assert_eq!(prev_track(&mut q, true).id, "a");
    }

    #[test]
    fn test_random_next_after_previous_replays_forward() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c"], 0);
        let first = next_track(&mut q, false);
        let second = next_track(&mut q, false);
        prev_track(&mut q, true);
        prev_track(&mut q, true);
        assert_eq!(q.current_track().unwrap().id, "a");

        assert_eq!(next_track(&mut q, false).id, first.id);
        assert_eq!(next_track(&mut q, false).id, second.id);
    }

    #[test]
    fn test_random_exhausts_then_stops() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c"], 0);
        let first = next_track(&mut q, false);
        let second = next_track(&mut q, false);
        assert_ne!(first.id, second.id);
        assert_eq!(q.advance_next(false), Advance::Stop);
        assert!(q.current().is_none());
    }

    #[test]
    fn test_random_lookahead_is_cached() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c"], 0);
        let peeked = q.peek_next().unwrap();
        assert_eq!(q.peek_next().unwrap().id, peeked.id);
        assert_eq!(next_track(&mut q, false).id, peeked.id);
    }

    #[test]
    fn test_lookahead_invalidated_on_track_change() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c"], 0);
        q.peek_next();
        q.play_from_list(tracks(&["a", "b", "c"]), "l1".into(), 1)
            .unwrap();
        // History now holds a and b, leaving c as the only candidate.
        assert_eq!(q.peek_next().unwrap().id, "c");
    }

    #[test]
    fn test_single_loop_peeks_current_for_preload() {
        let mut q = playing(PlayMode::SingleLoop, &["a", "b", "c"], 1);
        assert_eq!(q.peek_next().unwrap().id, "b");
    }

    #[test]
    fn test_history_prunes_entries_for_removed_tracks() {
        let mut q = playing(PlayMode::Random, &["a", "b", "c", "d"], 0);
        let p1 = next_track(&mut q, false);
        let p2 = next_track(&mut q, false);
        let p3 = next_track(&mut q, false);

        // User removed p2 from the list; the next snapshot reflects that.
        let shrunk: Vec<Track> = tracks(&["a", "b", "c", "d"])
            .into_iter()
            .filter(|t| t.id != p2.id)
            .collect();
        let p3_index = shrunk.iter().position(|t| t.id == p3.id).unwrap();
        q.play_from_list(shrunk, "l1".into(), p3_index).unwrap();

        assert_eq!(prev_track(&mut q, true).id, p1.id);
        assert!(!q.history_track_ids().contains(&p2.id));
    }
}
