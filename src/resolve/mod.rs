//! URL resolution: the seam to external source plugins plus the retry,
//! backoff and staleness pipeline wrapped around them.
//!
//! Implementations translate a track identity into a playable URL. The
//! playback core never caches URLs; every transition asks for a fresh one.

pub mod pipeline;

pub use pipeline::UrlPipeline;

use async_trait::async_trait;

use crate::error::Result;
use crate::quality::Quality;
use crate::track::Track;

/// Options for one resolver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Force a fresh URL instead of whatever the source has cached.
    pub is_refresh: bool,
    /// Let the source fall back to its sibling sources on failure. Disabled
    /// when resolving a toggled identity so the sources cannot bounce a
    /// request between each other forever.
    pub allow_source_toggle: bool,
}

/// A freshly resolved playback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub url: String,
    /// The quality the source actually granted, which may differ from the
    /// requested one.
    pub quality: Quality,
}

/// Source plugin capability: resolve a track to a playable URL.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve_url(
        &self,
        track: &Track,
        quality: Quality,
        opts: &ResolveOptions,
    ) -> Result<ResolvedUrl>;
}
