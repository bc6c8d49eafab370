use crate::forms::ModJobRequest;
use crate::routes::{error_response, internal_error, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use palserver_admin::{
    error::{Error, ErrorKind},
    mods::{
        with_authorization, AuthorizationGate, HttpModInstaller, InstallOutcome,
        InstallProgress, ModEntry, ModJob, ModOperation,
    },
    storage::{load_config, save_config},
};
use serde::Serialize;
use std::{
    convert::Infallible,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{info, warn};

/// At most one mod job runs at a time; its progress is rebroadcast to SSE
/// subscribers.
#[derive(Clone)]
pub struct ModJobs {
    progress: broadcast::Sender<InstallProgress>,
    running: Arc<AtomicBool>,
    last_outcome: Arc<Mutex<Option<InstallOutcome>>>,
}

impl Default for ModJobs {
    fn default() -> Self {
        Self::new()
    }
}

impl ModJobs {
    pub fn new() -> Self {
        let (progress, _) = broadcast::channel(64);
        Self {
            progress,
            running: Arc::new(AtomicBool::new(false)),
            last_outcome: Arc::new(Mutex::new(None)),
        }
    }

    fn launch(&self, job: ModJob, operations: Vec<ModOperation>, config_path: PathBuf) {
        let (mut progress, handle) = job.spawn(operations);
        let jobs = self.clone();
        tokio::spawn(async move {
            while let Some(update) = progress.recv().await {
                let _ = jobs.progress.send(update);
            }
            match handle.await {
                Ok(outcome) => {
                    if let Err(message) = record_installed(&config_path, &outcome.installed).await {
                        warn!(%message, "failed to record installed mods");
                    }
                    info!(
                        succeeded = outcome.succeeded,
                        failed = outcome.failed.len(),
                        "mod job finished"
                    );
                    *jobs.last_outcome.lock().await = Some(outcome);
                }
                Err(err) => warn!(error = %err, "mod job panicked"),
            }
            jobs.running.store(false, Ordering::SeqCst);
        });
    }
}

async fn record_installed(config_path: &Path, installed: &[ModEntry]) -> Result<(), String> {
    let mut config = load_config(config_path).await?;
    config.installed_mods = installed.to_vec();
    save_config(config_path, &config).await
}

/// Authorization recorded in the manager config. The login flow itself
/// happens outside this process.
struct ConfigGate {
    authorized: bool,
}

#[async_trait::async_trait]
impl AuthorizationGate for ConfigGate {
    async fn check_cached(&self) -> bool {
        self.authorized
    }

    fn run_interactive_flow(&self, _on_success: Box<dyn FnOnce() + Send>) {
        warn!("mod installation is not authorized; set mods_authorized after completing the login");
    }
}

#[derive(Serialize)]
pub struct ModsResponse {
    installed: Vec<ModEntry>,
    running: bool,
    last_outcome: Option<InstallOutcome>,
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<ModsResponse>, (StatusCode, String)> {
    let config = load_config(&state.config_path).await.map_err(internal_error)?;
    Ok(Json(ModsResponse {
        installed: config.installed_mods,
        running: state.mods.running.load(Ordering::SeqCst),
        last_outcome: state.mods.last_outcome.lock().await.clone(),
    }))
}

#[derive(Serialize)]
pub struct JobAccepted {
    operations: usize,
}

pub async fn start_job(
    State(state): State<AppState>,
    Json(request): Json<ModJobRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), (StatusCode, String)> {
    let operations: Vec<ModOperation> = request
        .uninstall
        .into_iter()
        .map(ModOperation::Uninstall)
        .chain(request.install.into_iter().map(ModOperation::Install))
        .collect();
    if operations.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "no mod operations requested".to_string()));
    }

    let config = load_config(&state.config_path).await.map_err(internal_error)?;
    let game_dir = config.server_dir().ok_or_else(|| {
        error_response(Error::new(ErrorKind::InvalidArgument, "server_exe is not configured"))
    })?;
    let installer = HttpModInstaller::new(config.mod_unpack_program.clone()).map_err(error_response)?;

    if state.mods.running.swap(true, Ordering::SeqCst) {
        return Err((StatusCode::CONFLICT, "a mod job is already running".to_string()));
    }

    let total = operations.len();
    let job = ModJob::new(Arc::new(installer), game_dir, config.installed_mods.clone());
    let jobs = state.mods.clone();
    let config_path = state.config_path.clone();
    let gate = ConfigGate {
        authorized: config.mods_authorized,
    };
    let started = with_authorization(
        &gate,
        Box::new(move || jobs.launch(job, operations, config_path)),
    )
    .await;
    if !started {
        state.mods.running.store(false, Ordering::SeqCst);
        return Err((
            StatusCode::FORBIDDEN,
            "mod installation requires authorization".to_string(),
        ));
    }

    info!(operations = total, "mod job started");
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { operations: total })))
}

pub async fn progress(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.mods.progress.subscribe();
    let stream = BroadcastStream::new(receiver)
        .filter_map(|message| message.ok())
        .map(|update| {
            let event = Event::default().event("progress");
            Ok(event
                .json_data(&update)
                .unwrap_or_else(|_| Event::default().data(update.name)))
        });
    Sse::new(stream)
}
