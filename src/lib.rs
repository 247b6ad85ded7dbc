//! # Segue
//!
//! Headless music playback core: a play queue with per-mode advancement
//! rules, quality-aware URL resolution with retry and fallback, and a
//! dual-sink audio engine that crossfades between a playing track and a
//! preloaded next track.
//!
//! The orchestrator task ties those pieces together and is driven over an
//! HTTP/SSE control surface; see `api` for the endpoints and `events` for
//! everything a client can observe.

pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod library;
pub mod orchestrator;
pub mod quality;
pub mod queue;
pub mod resolve;
pub mod state;
pub mod track;

pub use error::{Error, Result};
pub use state::SharedState;
