//! SSE transport: `GET /sse` opens a session stream, `POST /messages`
//! delivers client messages whose responses are pushed onto that stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use super::server;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// `GET /sse`: the first event is `endpoint`, naming the URL to POST to.
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (guard, rx) = state.sessions.open();
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={}", guard.id()));

    // The guard lives as long as the stream; dropping it closes the session.
    let messages = ReceiverStream::new(rx).map(move |message| {
        let _session = &guard;
        Ok::<_, Infallible>(Event::default().event("message").data(message.to_string()))
    });
    let stream = stream::once(async move { Ok::<_, Infallible>(endpoint) })
        .chain(messages)
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// `POST /messages?session_id=<id>`: answers `202` and handles the message
/// in the background.
pub async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(message): Json<Value>,
) -> StatusCode {
    let Some(session) = state.sessions.get(&query.session_id) else {
        tracing::debug!(session_id = %query.session_id, "SSE message for unknown session");
        return StatusCode::NOT_FOUND;
    };

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let response =
            server::handle_message_with_cancel(&dispatcher, message, &session.cancel).await;
        if let Some(response) = response {
            if session.sender.send(response).await.is_err() {
                tracing::debug!("SSE session closed before the response was delivered");
            }
        }
    });

    StatusCode::ACCEPTED
}
