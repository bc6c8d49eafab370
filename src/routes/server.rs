use crate::forms::CountdownRequest;
use crate::routes::{error_response, internal_error, persist_pid, AppState};
use axum::{extract::State, http::StatusCode, Json};
use palserver_admin::{
    clock::format_duration,
    lifecycle::{SequencerStatus, DEFAULT_SHUTDOWN_COUNTDOWN_SECS},
    rest_api::ApiPayload,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    status: SequencerStatus,
    uptime: Option<String>,
}

impl From<SequencerStatus> for StatusResponse {
    fn from(status: SequencerStatus) -> Self {
        let uptime = status.uptime_secs.map(format_duration);
        Self { status, uptime }
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.sequencer.lock().await.status().into())
}

pub async fn start(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let status = {
        let mut sequencer = state.sequencer.lock().await;
        sequencer.start_server().await.map_err(error_response)?;
        sequencer.status()
    };
    persist_pid(&state, status.pid).await.map_err(internal_error)?;
    Ok(Json(status.into()))
}

pub async fn stop(
    State(state): State<AppState>,
) -> Result<Json<ApiPayload>, (StatusCode, String)> {
    let payload = state
        .sequencer
        .lock()
        .await
        .stop_server()
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}

pub async fn kill(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let status = {
        let mut sequencer = state.sequencer.lock().await;
        sequencer.kill_server().await.map_err(error_response)?;
        sequencer.status()
    };
    persist_pid(&state, None).await.map_err(internal_error)?;
    Ok(Json(status.into()))
}

pub async fn restart(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let mut sequencer = state.sequencer.lock().await;
    sequencer.begin_restart().map_err(error_response)?;
    Ok(Json(sequencer.status().into()))
}

pub async fn shutdown_countdown(
    State(state): State<AppState>,
    request: Option<Json<CountdownRequest>>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let seconds = request
        .and_then(|Json(request)| request.seconds)
        .unwrap_or(DEFAULT_SHUTDOWN_COUNTDOWN_SECS);
    let mut sequencer = state.sequencer.lock().await;
    sequencer
        .begin_shutdown_countdown(seconds)
        .map_err(error_response)?;
    Ok(Json(sequencer.status().into()))
}

pub async fn abort(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut sequencer = state.sequencer.lock().await;
    sequencer.abort();
    Json(sequencer.status().into())
}
