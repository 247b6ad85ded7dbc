//! HTTP control surface.
//!
//! A thin layer over the orchestrator: POST endpoints translate to
//! [`PlayerCommand`]s and return immediately, GET endpoints read
//! [`SharedState`] snapshots, and `/events` streams the player event bus
//! over SSE. Nothing here mutates playback state directly.

pub mod handlers;
pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::LocalLibrary;
use crate::orchestrator::PlayerHandle;
use crate::state::SharedState;

/// Shared application context passed to all handlers.
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub library: Arc<LocalLibrary>,
    pub player: PlayerHandle,
}

/// Build the full router: `/health` at the root, everything else under
/// `/api/v1`.
pub fn router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/playback/status", get(handlers::status))
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/toggle", post(handlers::toggle))
        .route("/playback/stop", post(handlers::stop))
        .route("/playback/next", post(handlers::next))
        .route("/playback/previous", post(handlers::previous))
        .route("/playback/seek", post(handlers::seek))
        .route("/playback/volume", get(handlers::get_volume))
        .route("/playback/volume", post(handlers::set_volume))
        .route("/playback/mode", get(handlers::get_mode))
        .route("/playback/mode", post(handlers::set_mode))
        .route("/queue", get(handlers::get_queue))
        .route("/queue/enqueue", post(handlers::enqueue))
        .route("/queue/temp", delete(handlers::clear_temp))
        .route("/library", get(handlers::library))
        .route("/events", get(sse::event_stream));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server until `shutdown` resolves or the server fails.
pub async fn serve(
    config: &Config,
    ctx: AppContext,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("bad listen address: {e}")))?;
    let app = router(ctx);

    info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Internal(format!("server error: {e}")))?;
    Ok(())
}
