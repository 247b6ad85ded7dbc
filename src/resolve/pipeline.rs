//! Retry, backoff and staleness handling around the source resolver.
//!
//! One active (foreground) resolution and one preload resolution may be in
//! flight at a time. Starting a new active resolution supersedes both; a
//! superseded request observes its cancel flag at the next suspension point
//! and reports `Ok(None)` instead of an error, because being overtaken is
//! not a failure the user should hear about.
//!
//! Retry policy per request: a rate-limited attempt waits a randomized
//! 2..=6 s (cancellable) and retries once; any other failure retries once
//! immediately with `is_refresh` forced on. The second failure propagates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::{ResolveOptions, ResolvedUrl, SourceResolver};
use crate::error::{Error, Result};
use crate::events::{EventBus, PlayerEvent, ResolvePhase};
use crate::quality::{fallback, FallbackStrategy, Quality};
use crate::track::{ResolutionToken, Track};

/// Cancellation flag shared between a resolution future and whoever may
/// supersede it. The flag is checked after registering for notification so
/// a cancel between "check" and "wait" cannot be lost.
#[derive(Debug, Default)]
pub(crate) struct CancelFlag {
    flagged: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.flagged.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.flagged.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

struct ActiveResolve {
    token: ResolutionToken,
    cancel: Arc<CancelFlag>,
}

/// URL resolution pipeline wrapping a [`SourceResolver`].
pub struct UrlPipeline {
    resolver: Arc<dyn SourceResolver>,
    bus: EventBus,
    active: Mutex<Option<ActiveResolve>>,
    preload: Mutex<Option<Arc<CancelFlag>>>,
}

impl UrlPipeline {
    pub fn new(resolver: Arc<dyn SourceResolver>, bus: EventBus) -> Self {
        Self {
            resolver,
            bus,
            active: Mutex::new(None),
            preload: Mutex::new(None),
        }
    }

    /// Foreground resolution for the track the user is hearing.
    ///
    /// `Ok(None)` means the result no longer matters: this request was
    /// superseded by a newer one, cancelled by a stop, or was a duplicate of
    /// a resolution already in flight for the same identity.
    pub async fn resolve_active(
        &self,
        track: &Track,
        quality: Quality,
    ) -> Result<Option<ResolvedUrl>> {
        let token = track.resolution_token();
        let Some(cancel) = self.begin(token.clone()).await else {
            debug!("resolution already in flight for {token}");
            return Ok(None);
        };
        self.emit_status(track, ResolvePhase::GettingUrl);
        let result = self
            .attempt_with_retries(track, quality, false, false, &cancel)
            .await;
        let outcome = match result {
            Ok(url) => {
                if self.is_current(&token).await {
                    Ok(Some(url))
                } else {
                    debug!("discarding stale resolution for {token}");
                    Ok(None)
                }
            }
            Err(Error::Cancelled) => Ok(None),
            Err(e) => Err(e),
        };
        self.finish(&token).await;
        outcome
    }

    /// Silent resolution for the upcoming track. Always refreshes, emits no
    /// status, and skips the current-track staleness check; the caller
    /// verifies the "next" track is still the same before using the result.
    ///
    /// `Ok(None)` means the preload was superseded.
    pub async fn resolve_preload(
        &self,
        track: &Track,
        quality: Quality,
    ) -> Result<Option<ResolvedUrl>> {
        let cancel = Arc::new(CancelFlag::default());
        {
            let mut slot = self.preload.lock().await;
            if let Some(old) = slot.replace(cancel.clone()) {
                old.cancel();
            }
        }
        let result = self
            .attempt_with_retries(track, quality, true, true, &cancel)
            .await;
        {
            let mut slot = self.preload.lock().await;
            if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &cancel)) {
                *slot = None;
            }
        }
        match result {
            Ok(url) => Ok(Some(url)),
            Err(Error::Cancelled) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Download resolution: requested quality first, then the fallback
    /// order restricted to what the track exposes. Never fails; exhaustion
    /// (or a rate limit, which later attempts would only aggravate) yields
    /// `None` and the download is marked failed by the caller.
    pub async fn resolve_download(
        &self,
        track: &Track,
        quality: Quality,
        strategy: FallbackStrategy,
    ) -> Option<ResolvedUrl> {
        let mut order = vec![quality];
        order.extend(fallback(quality, &track.available, strategy));
        let opts = ResolveOptions {
            is_refresh: false,
            allow_source_toggle: true,
        };
        for q in order {
            match self.resolver.resolve_url(track, q, &opts).await {
                Ok(url) => return Some(url),
                Err(e) if e.is_fallback_worthy() => {
                    warn!("download resolve failed for {} at {q}: {e}", track.id);
                }
                Err(e) => {
                    warn!("download resolve aborted for {}: {e}", track.id);
                    return None;
                }
            }
        }
        None
    }

    /// Cancel the in-flight active resolution, if any. Called on stop and
    /// on track changes that do not start a new resolution.
    pub async fn cancel_active(&self) {
        if let Some(active) = self.active.lock().await.take() {
            debug!("cancelling resolution for {}", active.token);
            active.cancel.cancel();
        }
    }

    /// Cancel the in-flight preload resolution, if any.
    pub async fn cancel_preload(&self) {
        if let Some(cancel) = self.preload.lock().await.take() {
            cancel.cancel();
        }
    }

    pub async fn cancel_all(&self) {
        self.cancel_active().await;
        self.cancel_preload().await;
    }

    /// Register an active resolution, superseding any previous one. `None`
    /// when the same identity is already being resolved.
    async fn begin(&self, token: ResolutionToken) -> Option<Arc<CancelFlag>> {
        let cancel = {
            let mut active = self.active.lock().await;
            if let Some(current) = active.as_ref() {
                if current.token == token {
                    return None;
                }
                current.cancel.cancel();
            }
            let cancel = Arc::new(CancelFlag::default());
            *active = Some(ActiveResolve {
                token,
                cancel: cancel.clone(),
            });
            cancel
        };
        // A new foreground resolution always invalidates the pending
        // preload; the upcoming track will be re-peeked afterwards.
        self.cancel_preload().await;
        Some(cancel)
    }

    async fn finish(&self, token: &ResolutionToken) {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.token == *token) {
            *active = None;
        }
    }

    async fn is_current(&self, token: &ResolutionToken) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| a.token == *token)
    }

    async fn attempt_with_retries(
        &self,
        track: &Track,
        quality: Quality,
        preload: bool,
        is_refresh: bool,
        cancel: &CancelFlag,
    ) -> Result<ResolvedUrl> {
        let mut refresh = is_refresh;
        let mut retried = false;
        loop {
            match self
                .attempt_once(track, quality, preload, refresh, cancel)
                .await
            {
                Ok(url) => return Ok(url),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(Error::TooManyRequests(msg)) if !retried => {
                    retried = true;
                    let wait = rand::thread_rng().gen_range(2..=6);
                    debug!(
                        "rate limited resolving {} ({msg}), retrying in {wait}s",
                        track.id
                    );
                    if !preload {
                        self.emit_status(track, ResolvePhase::RetryWait { seconds: wait });
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
                    }
                }
                Err(e) if !retried => {
                    retried = true;
                    refresh = true;
                    debug!("resolve failed for {} ({e}), retrying with refresh", track.id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One resolution pass: the toggled identity first when the user picked
    /// one, then the native identity with automatic source toggling allowed.
    async fn attempt_once(
        &self,
        track: &Track,
        quality: Quality,
        preload: bool,
        is_refresh: bool,
        cancel: &CancelFlag,
    ) -> Result<ResolvedUrl> {
        if let Some(alt) = track.toggled_identity() {
            if !preload {
                self.emit_status(
                    track,
                    ResolvePhase::ToggleSource {
                        source: alt.source.clone(),
                    },
                );
            }
            let opts = ResolveOptions {
                is_refresh,
                allow_source_toggle: false,
            };
            match self.call_resolver(&alt, quality, opts, cancel).await {
                Ok(url) => return Ok(url),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    debug!(
                        "toggled source failed for {} ({e}), trying native source",
                        track.id
                    );
                }
            }
        }
        let opts = ResolveOptions {
            is_refresh,
            allow_source_toggle: true,
        };
        self.call_resolver(track, quality, opts, cancel).await
    }

    async fn call_resolver(
        &self,
        track: &Track,
        quality: Quality,
        opts: ResolveOptions,
        cancel: &CancelFlag,
    ) -> Result<ResolvedUrl> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = self.resolver.resolve_url(track, quality, &opts) => res,
        }
    }

    fn emit_status(&self, track: &Track, phase: ResolvePhase) {
        self.bus
            .emit_lossy(PlayerEvent::resolve_status(track.id.clone(), phase));
    }
}
