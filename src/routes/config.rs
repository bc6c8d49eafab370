use crate::routes::{internal_error, AppState};
use axum::{extract::State, http::StatusCode, Json};
use palserver_admin::storage::{load_config, save_config, ManagerConfig};
use tracing::info;

pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<ManagerConfig>, (StatusCode, String)> {
    let config = load_config(&state.config_path).await.map_err(internal_error)?;
    Ok(Json(config))
}

/// Saves the config and applies the policies to the running sequencer.
pub async fn set_config(
    State(state): State<AppState>,
    Json(mut config): Json<ManagerConfig>,
) -> Result<Json<ManagerConfig>, (StatusCode, String)> {
    config
        .validate()
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;

    let existing = load_config(&state.config_path).await.map_err(internal_error)?;
    config.server_pid = existing.server_pid;
    config.installed_mods = existing.installed_mods;
    save_config(&state.config_path, &config)
        .await
        .map_err(internal_error)?;

    let mut sequencer = state.sequencer.lock().await;
    sequencer.set_policy(config.lifecycle_policy());
    sequencer.backup_mut().set_policy(config.backup_policy());
    info!("manager config updated");
    Ok(Json(config))
}
