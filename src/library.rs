//! Bundled local-filesystem music source.
//!
//! Scans a directory tree once at startup and exposes the result as a
//! single play list. Doubles as the bundled [`SourceResolver`]: local track
//! ids are absolute paths, so resolution is a file-existence check away
//! from a `file://` URL.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::quality::Quality;
use crate::resolve::{ResolveOptions, ResolvedUrl, SourceResolver};
use crate::track::{ListId, Track};

pub const SOURCE_NAME: &str = "local";
pub const LIST_ID: &str = "library";

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a"];

/// Tracks discovered under the configured music directory.
pub struct LocalLibrary {
    tracks: Vec<Track>,
}

impl LocalLibrary {
    /// Walk `root` and collect every audio file. A missing directory yields
    /// an empty library rather than an error so the server still starts.
    pub fn scan(root: &Path) -> LocalLibrary {
        if !root.is_dir() {
            warn!("music directory {} not found, library is empty", root.display());
            return LocalLibrary { tracks: Vec::new() };
        }
        let mut tracks = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(ext) = extension_of(path) else {
                continue;
            };
            if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            tracks.push(track_for(root, path, &ext));
        }
        tracks.sort_by(|a, b| a.id.cmp(&b.id));
        info!("library scan of {} found {} tracks", root.display(), tracks.len());
        LocalLibrary { tracks }
    }

    /// Build a library from an explicit track list, in the given order.
    /// Used by embedders and tests that do not scan a directory.
    pub fn from_tracks(tracks: Vec<Track>) -> LocalLibrary {
        LocalLibrary { tracks }
    }

    pub fn list_id(&self) -> ListId {
        LIST_ID.to_string()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn track_for(root: &Path, path: &Path, ext: &str) -> Track {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    // Files named "Artist - Title" carry their own tag line.
    let (artist, name) = match stem.split_once(" - ") {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => (String::new(), stem.to_string()),
    };
    let album = path
        .parent()
        .filter(|p| *p != root)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string);
    let quality = match ext {
        "flac" | "wav" => Quality::Flac,
        _ => Quality::Q320k,
    };
    let mut available = BTreeSet::new();
    available.insert(quality);
    Track {
        id: path.to_string_lossy().into_owned(),
        source: SOURCE_NAME.to_string(),
        name,
        artist,
        album,
        duration_ms: None,
        available,
        toggle: None,
    }
}

/// Resolver for tracks discovered by [`LocalLibrary`].
pub struct LocalResolver;

#[async_trait]
impl SourceResolver for LocalResolver {
    async fn resolve_url(
        &self,
        track: &Track,
        quality: Quality,
        _opts: &ResolveOptions,
    ) -> Result<ResolvedUrl> {
        if track.source != SOURCE_NAME {
            return Err(Error::NotFound(format!(
                "no resolver for source '{}'",
                track.source
            )));
        }
        let path = PathBuf::from(&track.id);
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(Error::NotFound(format!(
                "file no longer exists: {}",
                path.display()
            )));
        }
        // A local file exists at exactly one quality; requests for others
        // resolve to what is on disk.
        let actual = track
            .available
            .iter()
            .next_back()
            .copied()
            .unwrap_or(quality);
        debug!("resolved {} at {actual}", track.id);
        Ok(ResolvedUrl {
            url: format!("file://{}", path.display()),
            quality: actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_finds_audio_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.mp3"));
        touch(&dir.path().join("album/a.flac"));
        touch(&dir.path().join("album/cover.jpg"));
        touch(&dir.path().join("notes.txt"));

        let library = LocalLibrary::scan(dir.path());
        assert_eq!(library.len(), 2);
        let names: Vec<&str> = library.tracks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(library.tracks()[0].album.as_deref(), Some("album"));
        assert_eq!(library.tracks()[1].album, None);
        assert!(library.tracks()[0].available.contains(&Quality::Flac));
        assert!(library.tracks()[1].available.contains(&Quality::Q320k));
    }

    #[test]
    fn test_artist_title_split_from_file_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Miles Davis - So What.flac"));
        let library = LocalLibrary::scan(dir.path());
        assert_eq!(library.tracks()[0].artist, "Miles Davis");
        assert_eq!(library.tracks()[0].name, "So What");
    }

    #[test]
    fn test_missing_directory_is_empty_not_fatal() {
        let library = LocalLibrary::scan(Path::new("/no/such/music/dir"));
        assert!(library.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_returns_file_url_for_existing_track() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("song.mp3"));
        let library = LocalLibrary::scan(dir.path());
        let track = &library.tracks()[0];

        let resolved = LocalResolver
            .resolve_url(track, Quality::Flac, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(resolved.url.starts_with("file://"));
        assert!(resolved.url.ends_with("song.mp3"));
        assert_eq!(resolved.quality, Quality::Q320k);
    }

    #[tokio::test]
    async fn test_resolver_rejects_missing_files_and_foreign_sources() {
        let mut track = Track {
            id: "/no/such/file.mp3".to_string(),
            source: SOURCE_NAME.to_string(),
            name: "gone".to_string(),
            artist: String::new(),
            album: None,
            duration_ms: None,
            available: BTreeSet::new(),
            toggle: None,
        };
        let err = LocalResolver
            .resolve_url(&track, Quality::Q320k, &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        track.source = "stream".to_string();
        let err = LocalResolver
            .resolve_url(&track, Quality::Q320k, &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
