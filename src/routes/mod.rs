pub mod config;
pub mod console;
pub mod health;
pub mod mods;
pub mod players;
pub mod server;
pub mod world_settings;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use palserver_admin::{
    backup::AutoBackup,
    clock::{Clock, SystemClock},
    error::{Error, ErrorKind},
    lifecycle::LifecycleSequencer,
    rest_api::HttpConnector,
    storage::{config_path, load_config, save_config, ManagerConfig},
    supervisor::LocalSupervisor,
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub sequencer: Arc<Mutex<LifecycleSequencer>>,
    pub supervisor: LocalSupervisor,
    pub mods: mods::ModJobs,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(server::status))
        .route("/api/connect", post(players::connect))
        .route("/api/connect/from-settings", post(players::connect_from_settings))
        .route("/api/server/start", post(server::start))
        .route("/api/server/stop", post(server::stop))
        .route("/api/server/kill", post(server::kill))
        .route("/api/server/restart", post(server::restart))
        .route("/api/server/abort", post(server::abort))
        .route("/api/server/shutdown-countdown", post(server::shutdown_countdown))
        .route("/api/broadcast", post(players::broadcast))
        .route("/api/players", get(players::list))
        .route("/api/players/kick", post(players::kick))
        .route("/api/players/ban", post(players::ban))
        .route("/api/players/unban", post(players::unban))
        .route("/api/save", post(players::save))
        .route("/api/command", post(players::command))
        .route(
            "/api/world-settings",
            get(world_settings::get_settings).post(world_settings::update_settings),
        )
        .route("/api/world-settings/defaults", post(world_settings::restore_defaults))
        .route("/api/world-settings/enable-rest-api", post(world_settings::enable_rest_api))
        .route("/api/world-settings/identity", post(world_settings::set_identity))
        .route("/api/console/tail", get(console::tail))
        .route("/api/console/stream", get(console::stream))
        .route("/api/notices/stream", get(console::notices))
        .route("/api/mods", get(mods::list))
        .route("/api/mods/jobs", post(mods::start_job))
        .route("/api/mods/progress", get(mods::progress))
        .route("/api/config", get(config::get_config).post(config::set_config))
        .with_state(state)
}

pub async fn default_state() -> AppState {
    let config_path = config_path();
    let config = match load_config(&config_path).await {
        Ok(config) => config,
        Err(message) => {
            warn!(%message, "using default config");
            ManagerConfig::default()
        }
    };

    let supervisor = LocalSupervisor::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backup = match config.backup_policy() {
        Some(policy) => AutoBackup::starting_at(policy, clock.now()),
        None => AutoBackup::disabled(),
    };
    let mut sequencer = LifecycleSequencer::new(
        Arc::new(HttpConnector),
        Arc::new(supervisor.clone()),
        clock,
        config.lifecycle_policy(),
    )
    .with_backup(backup);

    if let Some(pid) = config.server_pid {
        if !sequencer.adopt_process(pid).await {
            info!(pid, "saved server pid is no longer running");
        }
    }

    AppState {
        config_path,
        sequencer: Arc::new(Mutex::new(sequencer)),
        supervisor,
        mods: mods::ModJobs::new(),
    }
}

/// Records the tracked server pid so a restarted manager can adopt it.
pub async fn persist_pid(state: &AppState, pid: Option<u32>) -> Result<(), String> {
    let mut config = load_config(&state.config_path).await?;
    if config.server_pid == pid {
        return Ok(());
    }
    config.server_pid = pid;
    save_config(&state.config_path, &config).await
}

pub fn error_response(err: Error) -> (StatusCode, String) {
    let status = match err.kind {
        ErrorKind::BadRequest | ErrorKind::InvalidArgument | ErrorKind::ParseFailed => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotConnected => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ConnectionFailed | ErrorKind::HttpError => StatusCode::BAD_GATEWAY,
        ErrorKind::SequenceAborted | ErrorKind::Unknown | ErrorKind::Io => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

pub fn internal_error(message: String) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, message)
}
