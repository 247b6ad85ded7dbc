//! Configuration loading.
//!
//! A TOML file provides startup values; the CLI can override the listen
//! address and music directory. Playback settings are only *initial* values
//! here: at runtime they live in [`crate::state::SharedState`] and change
//! through the API.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::FadeCurve;
use crate::error::{Error, Result};
use crate::quality::{FallbackStrategy, Quality};
use crate::queue::PlayMode;

/// Runtime playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub play_mode: PlayMode,
    /// Master volume, `0.0..=1.0`.
    pub volume: f32,
    pub preferred_quality: Quality,
    /// Quality fallback strategy used when the preferred quality is not
    /// available for a track.
    pub download_fallback: FallbackStrategy,
    /// Crossfade length for seamless track switches.
    pub crossfade_ms: u64,
    /// Gain curve shape used during the crossfade.
    pub crossfade_curve: FadeCurve,
    /// How close to the end of a track the near-end signal fires.
    pub near_end_ms: u64,
    /// Skip to the next track after a resolution/playback error.
    pub auto_skip_on_error: bool,
    pub auto_skip_delay_ms: u64,
    /// Give up on a track whose URL resolution stalls this long.
    pub load_stall_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            play_mode: PlayMode::ListLoop,
            volume: 1.0,
            preferred_quality: Quality::Q320k,
            download_fallback: FallbackStrategy::Downgrade,
            crossfade_ms: 500,
            crossfade_curve: FadeCurve::CosineS,
            near_end_ms: 1000,
            auto_skip_on_error: true,
            auto_skip_delay_ms: 5000,
            load_stall_timeout_ms: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address.
    pub host: String,
    pub port: u16,
    /// Directory scanned by the local library plugin. Defaults to the
    /// platform music directory.
    pub music_dir: Option<PathBuf>,
    /// Output device name; the system default when unset.
    pub audio_device: Option<String>,
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
            music_dir: None,
            audio_device: None,
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// Load configuration. An explicit `path` must exist; otherwise the
    /// default locations are tried and missing files fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_file() {
                Some(p) => p,
                None => {
                    info!("no config file found, using defaults");
                    return Ok(Config::default());
                }
            },
        };
        let raw = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Range checks on settings; `load` runs this, and the binary runs it
    /// again after applying CLI overrides.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.settings.volume) {
            return Err(Error::Config(format!(
                "volume {} out of range 0.0..=1.0",
                self.settings.volume
            )));
        }
        if self.settings.near_end_ms == 0 {
            return Err(Error::Config(
                "near_end_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn music_dir(&self) -> PathBuf {
        self.music_dir.clone().unwrap_or_else(default_music_dir)
    }
}

/// `~/.config/segue/config.toml`, then `/etc/segue/config.toml` on Linux.
fn default_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("segue").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system = PathBuf::from("/etc/segue/config.toml");
        if system.exists() {
            return Some(system);
        }
    }
    None
}

fn default_music_dir() -> PathBuf {
    dirs::audio_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 9000

            [settings]
            play_mode = "random"
            crossfade_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.settings.play_mode, PlayMode::Random);
        assert_eq!(config.settings.crossfade_ms, 250);
        assert_eq!(config.settings.near_end_ms, 1000);
        assert_eq!(config.settings.preferred_quality, Quality::Q320k);
        assert_eq!(config.settings.crossfade_curve, FadeCurve::CosineS);
    }

    #[test]
    fn test_out_of_range_volume_rejected() {
        let config: Config = toml::from_str(
            r#"
            [settings]
            volume = 1.5
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 7001\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.port, 7001);

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
