use crate::forms::{BroadcastRequest, CommandRequest, ConnectRequest, PlayerRequest};
use crate::routes::{error_response, internal_error, AppState};
use axum::{extract::State, http::StatusCode, Json};
use palserver_admin::{
    error::{Error, ErrorKind},
    rest_api::{ApiPayload, Connection, PlayerList, ServerInfo},
    storage::{load_config, save_config},
    world_settings::{self, rest_connection, settings_path_for},
};

type ApiResponse = Result<Json<ApiPayload>, (StatusCode, String)>;

pub async fn connect(
    State(state): State<AppState>,
    request: Option<Json<ConnectRequest>>,
) -> Result<Json<ServerInfo>, (StatusCode, String)> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let mut config = load_config(&state.config_path).await.map_err(internal_error)?;
    if let Some(host) = request.host {
        config.api_addr = host;
    }
    if let Some(port) = request.port {
        config.api_port = port;
    }
    if let Some(password) = request.password {
        config.api_password = password;
    }
    let connection = config
        .connection()
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;
    connect_and_remember(&state, connection).await
}

/// Connects with the REST endpoint described by the server's world settings.
pub async fn connect_from_settings(
    State(state): State<AppState>,
) -> Result<Json<ServerInfo>, (StatusCode, String)> {
    let config = load_config(&state.config_path).await.map_err(internal_error)?;
    let server_exe = config.server_exe_path().ok_or_else(|| {
        error_response(Error::new(ErrorKind::InvalidArgument, "server_exe is not configured"))
    })?;
    let document = world_settings::load(&settings_path_for(&server_exe))
        .await
        .map_err(error_response)?;
    let connection = rest_connection(&document, &config.api_addr).map_err(error_response)?;
    connect_and_remember(&state, connection).await
}

async fn connect_and_remember(
    state: &AppState,
    connection: Connection,
) -> Result<Json<ServerInfo>, (StatusCode, String)> {
    let (info, established) = {
        let mut sequencer = state.sequencer.lock().await;
        let info = sequencer
            .test_connection(connection)
            .await
            .map_err(error_response)?;
        (info, sequencer.connection().cloned())
    };

    if let Some(established) = established {
        let mut config = load_config(&state.config_path).await.map_err(internal_error)?;
        config.api_addr = established.host;
        config.api_port = established.port;
        config.api_password = established.password;
        save_config(&state.config_path, &config)
            .await
            .map_err(internal_error)?;
    }
    Ok(Json(info))
}

pub async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> ApiResponse {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }
    let mut sequencer = state.sequencer.lock().await;
    let payload = sequencer
        .announce(&request.message)
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<PlayerList>, (StatusCode, String)> {
    let players = state
        .sequencer
        .lock()
        .await
        .refresh_players()
        .await
        .map_err(error_response)?;
    Ok(Json(players))
}

pub async fn kick(
    State(state): State<AppState>,
    Json(request): Json<PlayerRequest>,
) -> ApiResponse {
    let payload = state
        .sequencer
        .lock()
        .await
        .kick_player(&request.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}

pub async fn ban(
    State(state): State<AppState>,
    Json(request): Json<PlayerRequest>,
) -> ApiResponse {
    let payload = state
        .sequencer
        .lock()
        .await
        .ban_player(&request.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}

pub async fn unban(
    State(state): State<AppState>,
    Json(request): Json<PlayerRequest>,
) -> ApiResponse {
    let payload = state
        .sequencer
        .lock()
        .await
        .unban_player(&request.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}

pub async fn save(State(state): State<AppState>) -> ApiResponse {
    let payload = state
        .sequencer
        .lock()
        .await
        .save_world()
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}

pub async fn command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResponse {
    let payload = state
        .sequencer
        .lock()
        .await
        .run_command(&request.command)
        .await
        .map_err(error_response)?;
    Ok(Json(payload))
}
