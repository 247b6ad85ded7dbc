//! Track data model
//!
//! Tracks are opaque to the playback core: they carry the identity a source
//! plugin needs to produce a playable URL, display metadata, and the set of
//! quality levels the source advertises for them. A track is immutable once
//! it has been resolved from a list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::quality::Quality;

/// Identifier of the list a track currently belongs to.
pub type ListId = String;

/// Alternate identity of the same recording on a different source plugin,
/// chosen by the user to override the native source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSource {
    /// Track id within the alternate source
    pub id: String,
    /// Alternate source plugin tag
    pub source: String,
}

/// A playable track as supplied by a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Opaque identifier, unique within its source
    pub id: String,
    /// Source plugin tag (`"local"`, or a network source name)
    pub source: String,
    /// Display title
    pub name: String,
    /// Display artist
    pub artist: String,
    /// Display album, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Nominal duration in milliseconds from list metadata. Playback timing
    /// always comes from the decoded audio, never from this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Quality levels the source advertises for this track
    #[serde(default)]
    pub available: BTreeSet<Quality>,
    /// User-selected alternate source identity, tried before the native one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<ToggleSource>,
}

impl Track {
    /// Resolution identity for this track in its current toggle state.
    pub fn resolution_token(&self) -> ResolutionToken {
        ResolutionToken {
            track_id: self.id.clone(),
            toggle_id: self.toggle.as_ref().map(|t| t.id.clone()),
        }
    }

    /// The same recording under its toggled-source identity, if one is set.
    /// The returned track carries no further toggle so resolution cannot
    /// bounce between identities.
    pub fn toggled_identity(&self) -> Option<Track> {
        let toggle = self.toggle.as_ref()?;
        let mut alt = self.clone();
        alt.id = toggle.id.clone();
        alt.source = toggle.source.clone();
        alt.toggle = None;
        Some(alt)
    }
}

/// Per-request identity used to discard stale URL-resolution results.
///
/// Two resolutions race only when they concern the same track *and* the same
/// toggle-source selection; any change to either invalidates in-flight work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionToken {
    pub track_id: String,
    pub toggle_id: Option<String>,
}

impl fmt::Display for ResolutionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.toggle_id {
            Some(toggle) => write!(f, "{}+{}", self.track_id, toggle),
            None => f.write_str(&self.track_id),
        }
    }
}
