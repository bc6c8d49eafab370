mod forms;
mod routes;

use std::{net::SocketAddr, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Player snapshots are refreshed every this many ticks.
const PLAYER_REFRESH_TICKS: u64 = 60;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state = routes::default_state().await;
    spawn_ticker(state.clone());
    let app = routes::build_router(state);

    let bind = std::env::var("PALADMIN_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind.parse().expect("invalid bind address");
    info!("server listening on http://{addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .expect("server failed");
}

fn spawn_ticker(state: routes::AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;
        let mut last_pid = state.sequencer.lock().await.status().pid;

        loop {
            interval.tick().await;
            ticks += 1;

            let (pid, backup) = {
                let mut sequencer = state.sequencer.lock().await;
                if let Err(err) = sequencer.tick().await {
                    warn!(error = %err, "sequencer tick failed");
                }
                if ticks % PLAYER_REFRESH_TICKS == 0 && sequencer.is_connected() {
                    if let Err(err) = sequencer.refresh_players().await {
                        debug!(error = %err, "player refresh failed");
                    }
                }
                (sequencer.status().pid, sequencer.due_backup())
            };
            if let Some(backup) = backup {
                tokio::spawn(backup);
            }

            if pid != last_pid {
                match routes::persist_pid(&state, pid).await {
                    Ok(()) => last_pid = pid,
                    Err(message) => warn!(%message, "failed to record server pid"),
                }
            }
        }
    });
}
