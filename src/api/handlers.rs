//! HTTP request handlers.
//!
//! Command endpoints answer `202 Accepted` as soon as the command is on the
//! orchestrator's channel; outcomes arrive on the `/events` stream. Query
//! endpoints serve state snapshots.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppContext;
use crate::events::PlaybackState;
use crate::orchestrator::PlayerCommand;
use crate::queue::PlayMode;
use crate::state::{NowPlaying, QueueSnapshot};
use crate::track::Track;

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: PlaybackState,
    pub now_playing: Option<NowPlaying>,
    pub volume: f32,
    pub mode: PlayMode,
}

/// GET /playback/status
pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let settings = ctx.state.settings().await;
    Json(StatusResponse {
        state: ctx.state.playback_state().await,
        now_playing: ctx.state.now_playing().await,
        volume: settings.volume,
        mode: settings.play_mode,
    })
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub list_id: String,
    pub index: usize,
}

/// POST /playback/play - resume playback, or start a specific list entry
/// when a body is given.
pub async fn play(State(ctx): State<AppContext>, body: Option<Json<PlayRequest>>) -> StatusCode {
    match body {
        Some(Json(req)) => ctx.player.send(PlayerCommand::PlayTrack {
            list_id: req.list_id,
            index: req.index,
        }),
        None => ctx.player.send(PlayerCommand::Play),
    }
    StatusCode::ACCEPTED
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> StatusCode {
    ctx.player.send(PlayerCommand::Pause);
    StatusCode::ACCEPTED
}

/// POST /playback/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> StatusCode {
    ctx.player.send(PlayerCommand::TogglePlay);
    StatusCode::ACCEPTED
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> StatusCode {
    ctx.player.send(PlayerCommand::Stop);
    StatusCode::ACCEPTED
}

/// POST /playback/next
pub async fn next(State(ctx): State<AppContext>) -> StatusCode {
    ctx.player.send(PlayerCommand::Next);
    StatusCode::ACCEPTED
}

/// POST /playback/previous
pub async fn previous(State(ctx): State<AppContext>) -> StatusCode {
    ctx.player.send(PlayerCommand::Previous);
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_ms: u64,
}

/// POST /playback/seek
pub async fn seek(State(ctx): State<AppContext>, Json(req): Json<SeekRequest>) -> StatusCode {
    ctx.player.send(PlayerCommand::Seek {
        position_ms: req.position_ms,
    });
    StatusCode::ACCEPTED
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    pub volume: f32,
}

/// GET /playback/volume
pub async fn get_volume(State(ctx): State<AppContext>) -> Json<VolumeResponse> {
    Json(VolumeResponse {
        volume: ctx.state.settings().await.volume,
    })
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: f32,
}

/// POST /playback/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> Result<StatusCode, ApiError> {
    if !(0.0..=1.0).contains(&req.volume) {
        return Err(bad_request("volume must be between 0.0 and 1.0"));
    }
    ctx.player.send(PlayerCommand::SetVolume(req.volume));
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: PlayMode,
}

/// GET /playback/mode
pub async fn get_mode(State(ctx): State<AppContext>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: ctx.state.queue_snapshot().await.mode,
    })
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: PlayMode,
}

/// POST /playback/mode
pub async fn set_mode(State(ctx): State<AppContext>, Json(req): Json<ModeRequest>) -> StatusCode {
    ctx.player.send(PlayerCommand::SetPlayMode(req.mode));
    StatusCode::ACCEPTED
}

/// GET /queue
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<QueueSnapshot> {
    Json(ctx.state.queue_snapshot().await)
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub play_next: bool,
}

/// POST /queue/enqueue
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Json(req): Json<EnqueueRequest>,
) -> Result<StatusCode, ApiError> {
    if req.tracks.is_empty() {
        return Err(bad_request("tracks must not be empty"));
    }
    debug!("Enqueue request for {} tracks", req.tracks.len());
    ctx.player.send(PlayerCommand::Enqueue {
        tracks: req.tracks,
        play_next: req.play_next,
    });
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /queue/temp
pub async fn clear_temp(State(ctx): State<AppContext>) -> StatusCode {
    ctx.player.send(PlayerCommand::ClearTemp);
    StatusCode::ACCEPTED
}

#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    pub list_id: String,
    pub tracks: Vec<Track>,
}

/// GET /library
pub async fn library(State(ctx): State<AppContext>) -> Json<LibraryResponse> {
    Json(LibraryResponse {
        list_id: ctx.library.list_id(),
        tracks: ctx.library.tracks().to_vec(),
    })
}
