use crate::forms::{IdentityRequest, WorldSettingsUpdate};
use crate::routes::{error_response, internal_error, AppState};
use axum::{extract::State, http::StatusCode, Json};
use palserver_admin::{
    error::{Error, ErrorKind},
    storage::{load_config, save_config},
    world_settings::{
        self, ensure_initialized, rest_connection, set_server_identity, settings_path_for,
        SettingsDocument,
    },
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

type DocumentResponse = Result<Json<SettingsDocument>, (StatusCode, String)>;

async fn settings_path(state: &AppState) -> Result<PathBuf, (StatusCode, String)> {
    let config = load_config(&state.config_path).await.map_err(internal_error)?;
    config
        .server_exe_path()
        .map(|exe| settings_path_for(&exe))
        .ok_or_else(|| {
            error_response(Error::new(ErrorKind::InvalidArgument, "server_exe is not configured"))
        })
}

pub async fn get_settings(State(state): State<AppState>) -> DocumentResponse {
    let path = settings_path(&state).await?;
    if tokio::fs::metadata(&path).await.is_ok() {
        ensure_initialized(&path).await.map_err(error_response)?;
    }
    let document = world_settings::load(&path).await.map_err(error_response)?;
    Ok(Json(document))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<WorldSettingsUpdate>,
) -> DocumentResponse {
    let path = settings_path(&state).await?;
    let mut document = world_settings::load(&path).await.map_err(error_response)?;
    for change in update.values {
        let quoted = change
            .quoted
            .or_else(|| document.entry(&change.key).map(|entry| entry.quoted))
            .unwrap_or(false);
        document
            .set(change.key.trim(), change.value, quoted)
            .map_err(error_response)?;
    }
    world_settings::save(&path, &document)
        .await
        .map_err(error_response)?;
    Ok(Json(document))
}

pub async fn restore_defaults(State(state): State<AppState>) -> DocumentResponse {
    let path = settings_path(&state).await?;
    world_settings::restore_defaults(&path)
        .await
        .map_err(error_response)?;
    let document = world_settings::load(&path).await.map_err(error_response)?;
    Ok(Json(document))
}

#[derive(Serialize)]
pub struct EnableRestApiResponse {
    port: u16,
    password: String,
}

/// Enables the REST API in the world settings and mirrors the generated
/// credentials into the manager config.
pub async fn enable_rest_api(
    State(state): State<AppState>,
) -> Result<Json<EnableRestApiResponse>, (StatusCode, String)> {
    let path = settings_path(&state).await?;
    let mut document = world_settings::load(&path).await.map_err(error_response)?;
    let password = world_settings::enable_rest_api(&mut document).map_err(error_response)?;
    world_settings::save(&path, &document)
        .await
        .map_err(error_response)?;

    let mut config = load_config(&state.config_path).await.map_err(internal_error)?;
    let connection = rest_connection(&document, &config.api_addr).map_err(error_response)?;
    config.api_port = connection.port;
    config.api_password = password.clone();
    save_config(&state.config_path, &config)
        .await
        .map_err(internal_error)?;
    info!(port = connection.port, "REST API enabled in world settings");

    Ok(Json(EnableRestApiResponse {
        port: connection.port,
        password,
    }))
}

pub async fn set_identity(
    State(state): State<AppState>,
    Json(request): Json<IdentityRequest>,
) -> DocumentResponse {
    let path = settings_path(&state).await?;
    let mut document = world_settings::load(&path).await.map_err(error_response)?;
    set_server_identity(&mut document, &request.name, &request.description)
        .map_err(error_response)?;
    world_settings::save(&path, &document)
        .await
        .map_err(error_response)?;
    Ok(Json(document))
}
