//! SSE stream of capture events, fed by the in-process event bus.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    /// Endpoint slug to watch
    pub endpoint: String,
}

/// `GET /api/v1/realtime?endpoint={slug}`
///
/// The subscription lives exactly as long as the SSE connection: dropping
/// the stream unregisters the subscriber from the bus.
pub async fn realtime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RealtimeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(endpoint = %query.endpoint, "SSE client connected");

    let subscriber = state.events.subscribe(&query.endpoint);

    let stream = futures::stream::once(async {
        Ok(Event::default().data(r#"{"type":"connected"}"#))
    })
    .chain(subscriber.filter_map(|event| async move {
        serde_json::to_string(&event)
            .ok()
            .map(|json| Ok(Event::default().data(json)))
    }));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
