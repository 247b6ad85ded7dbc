//! Server-sent player events.
//!
//! Streams every [`PlayerEvent`] to connected clients, with the event's
//! `type` tag as the SSE event name. A client that falls more than the bus
//! capacity behind misses the overwritten events and keeps receiving from
//! the current position.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::AppContext;
use crate::events::PlayerEvent;

/// GET /events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let rx = ctx.state.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => Some(Ok(to_sse_event(&event)?)),
            Err(e) => {
                warn!("SSE subscriber lagged: {e}");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(event: &PlayerEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.type_name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {e}");
            None
        }
    }
}
