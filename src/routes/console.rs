use crate::forms::TailQuery;
use crate::routes::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

#[derive(Serialize)]
pub struct TailResponse {
    lines: Vec<String>,
}

pub async fn tail(State(state): State<AppState>, Query(query): Query<TailQuery>) -> Json<TailResponse> {
    let lines = state.supervisor.tail(query.n.unwrap_or(200)).await;
    Json(TailResponse { lines })
}

pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.supervisor.subscribe();
    let stream = BroadcastStream::new(receiver)
        .filter_map(|message| message.ok())
        .map(|line| Ok(Event::default().data(line)));
    Sse::new(stream)
}

pub async fn notices(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.sequencer.lock().await.subscribe();
    let stream = BroadcastStream::new(receiver)
        .filter_map(|message| message.ok())
        .map(|notice| {
            let event = Event::default().event("notice");
            Ok(event
                .json_data(&notice)
                .unwrap_or_else(|_| Event::default().data(notice.message)))
        });
    Sse::new(stream)
}
