//! Server lifecycle sequencing.
//!
//! [`transition`] is a pure function from the current [`SequencerState`] to
//! the action due on this tick and the state to commit once that action
//! succeeds. [`LifecycleSequencer::tick`] performs the action against the
//! admin API or the process supervisor; any failure resets to `Idle`.
//!
//! Countdown counters are decremented before they are acted on: a restart
//! entered at 11 announces 10..=1 and shuts down on the eleventh tick.

use crate::backup::AutoBackup;
use crate::clock::Clock;
use crate::connect::probe_connection;
use crate::error::{Error, ErrorKind, Result};
use crate::launch::LaunchOptions;
use crate::rest_api::{
    AdminApi, AdminApiConnector, ApiResult, Connection, PlayerList, ServerInfo,
};
use crate::supervisor::ProcessSupervisor;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const RESTART_COUNTDOWN_TICKS: u32 = 11;
pub const RELAUNCH_GRACE_TICKS: u32 = 10;
pub const RECONNECT_GRACE_TICKS: u32 = 10;
pub const DEFAULT_SHUTDOWN_COUNTDOWN_SECS: u32 = 60;
pub const MIN_SHUTDOWN_COUNTDOWN_SECS: u32 = 10;
pub const MAX_SHUTDOWN_COUNTDOWN_SECS: u32 = 999;
const SHUTDOWN_WAIT_SECONDS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SequencerState {
    Idle,
    CountingDownRestart { ticks_remaining: u32 },
    CountingDownShutdown { ticks_remaining: u32 },
    AwaitingRelaunch { ticks_remaining: u32 },
    AwaitingReconnectVerify { ticks_remaining: u32 },
}

impl SequencerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SequencerState::Idle)
    }

    fn label(&self) -> &'static str {
        match self {
            SequencerState::Idle => "idle",
            SequencerState::CountingDownRestart { .. } => "restart countdown",
            SequencerState::CountingDownShutdown { .. } => "shutdown countdown",
            SequencerState::AwaitingRelaunch { .. } => "restart relaunch",
            SequencerState::AwaitingReconnectVerify { .. } => "restart reconnect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Wait,
    Announce(String),
    Shutdown { restarting: bool },
    Launch,
    VerifyConnection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: SequencerState,
}

pub fn transition(state: SequencerState) -> Transition {
    match state {
        SequencerState::Idle => Transition {
            action: Action::None,
            next: SequencerState::Idle,
        },
        SequencerState::CountingDownRestart { ticks_remaining } => {
            let remaining = ticks_remaining.saturating_sub(1);
            if remaining > 0 {
                Transition {
                    action: Action::Announce(restart_message(remaining)),
                    next: SequencerState::CountingDownRestart {
                        ticks_remaining: remaining,
                    },
                }
            } else {
                Transition {
                    action: Action::Shutdown { restarting: true },
                    next: SequencerState::AwaitingRelaunch {
                        ticks_remaining: RELAUNCH_GRACE_TICKS,
                    },
                }
            }
        }
        SequencerState::CountingDownShutdown { ticks_remaining } => {
            let remaining = ticks_remaining.saturating_sub(1);
            if remaining > 0 {
                Transition {
                    action: Action::Announce(shutdown_message(remaining)),
                    next: SequencerState::CountingDownShutdown {
                        ticks_remaining: remaining,
                    },
                }
            } else {
                Transition {
                    action: Action::Shutdown { restarting: false },
                    next: SequencerState::Idle,
                }
            }
        }
        SequencerState::AwaitingRelaunch { ticks_remaining } => {
            let remaining = ticks_remaining.saturating_sub(1);
            if remaining > 0 {
                Transition {
                    action: Action::Wait,
                    next: SequencerState::AwaitingRelaunch {
                        ticks_remaining: remaining,
                    },
                }
            } else {
                Transition {
                    action: Action::Launch,
                    next: SequencerState::AwaitingReconnectVerify {
                        ticks_remaining: RECONNECT_GRACE_TICKS,
                    },
                }
            }
        }
        SequencerState::AwaitingReconnectVerify { ticks_remaining } => {
            let remaining = ticks_remaining.saturating_sub(1);
            if remaining > 0 {
                Transition {
                    action: Action::Wait,
                    next: SequencerState::AwaitingReconnectVerify {
                        ticks_remaining: remaining,
                    },
                }
            } else {
                Transition {
                    action: Action::VerifyConnection,
                    next: SequencerState::Idle,
                }
            }
        }
    }
}

pub fn restart_message(seconds: u32) -> String {
    format!("The server will restart in {seconds} seconds!")
}

pub fn shutdown_message(seconds: u32) -> String {
    format!("The server will shut down in {seconds} seconds!")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Command,
    Info,
    Success,
    Error,
}

/// Operator-facing message published on every notable step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub crash_detection: bool,
    pub auto_restart: bool,
    pub auto_restart_after_secs: u64,
    /// Only auto-restart while at most `auto_restart_player_limit` players are online.
    pub auto_restart_player_gate: bool,
    pub auto_restart_player_limit: usize,
    pub launch: Option<LaunchOptions>,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            crash_detection: false,
            auto_restart: false,
            auto_restart_after_secs: 7200,
            auto_restart_player_gate: false,
            auto_restart_player_limit: 0,
            launch: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ServerProcess {
    pid: Option<u32>,
    expected_running: bool,
    started_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencerStatus {
    pub state: SequencerState,
    pub connected: bool,
    pub server_running: bool,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub player_count: usize,
    pub server_version: Option<String>,
    pub last_backup_at: Option<u64>,
}

/// Console-style admin command accepted by [`LifecycleSequencer::run_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Broadcast(String),
    Kick(String),
    Ban(String),
    Unban(String),
    Save,
    Shutdown,
}

impl AdminCommand {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (verb, rest) = match input.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (input, ""),
        };
        let argument = |name: &str| {
            if rest.is_empty() {
                Err(Error::new(ErrorKind::BadRequest, format!("{name} requires an argument")))
            } else {
                Ok(rest.to_string())
            }
        };

        match verb.to_ascii_lowercase().as_str() {
            "broadcast" => argument("broadcast").map(AdminCommand::Broadcast),
            "kickplayer" => argument("kickplayer").map(AdminCommand::Kick),
            "banplayer" => argument("banplayer").map(AdminCommand::Ban),
            "unbanplayer" => argument("unbanplayer").map(AdminCommand::Unban),
            "save" if rest.is_empty() => Ok(AdminCommand::Save),
            "shutdown" if rest.is_empty() => Ok(AdminCommand::Shutdown),
            _ => Err(Error::new(
                ErrorKind::BadRequest,
                format!("command not supported over the REST API: {input}"),
            )),
        }
    }
}

pub struct LifecycleSequencer {
    state: SequencerState,
    connector: Arc<dyn AdminApiConnector>,
    api: Option<Arc<dyn AdminApi>>,
    connection: Option<Connection>,
    connected: bool,
    server_info: Option<ServerInfo>,
    supervisor: Arc<dyn ProcessSupervisor>,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
    server: ServerProcess,
    players: PlayerList,
    backup: AutoBackup,
    notices: broadcast::Sender<Notice>,
}

impl LifecycleSequencer {
    pub fn new(
        connector: Arc<dyn AdminApiConnector>,
        supervisor: Arc<dyn ProcessSupervisor>,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
    ) -> Self {
        let (notices, _) = broadcast::channel(200);
        Self {
            state: SequencerState::Idle,
            connector,
            api: None,
            connection: None,
            connected: false,
            server_info: None,
            supervisor,
            clock,
            policy,
            server: ServerProcess::default(),
            players: PlayerList::default(),
            backup: AutoBackup::disabled(),
            notices,
        }
    }

    pub fn with_backup(mut self, backup: AutoBackup) -> Self {
        self.backup = backup;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn players(&self) -> &PlayerList {
        &self.players
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: LifecyclePolicy) {
        self.policy = policy;
    }

    pub fn backup_mut(&mut self) -> &mut AutoBackup {
        &mut self.backup
    }

    pub fn status(&self) -> SequencerStatus {
        let now = self.clock.now();
        SequencerStatus {
            state: self.state,
            connected: self.connected,
            server_running: self.server.expected_running,
            pid: self.server.pid,
            uptime_secs: self
                .server
                .started_at
                .filter(|_| self.server.expected_running)
                .map(|started| now.saturating_sub(started)),
            player_count: self.players.len(),
            server_version: self.server_info.as_ref().map(|info| info.version.clone()),
            last_backup_at: self.backup.last_completed_at(),
        }
    }

    /// Tracks a server that was already running before the manager started.
    pub async fn adopt_process(&mut self, pid: u32) -> bool {
        if !self.supervisor.is_alive(pid).await {
            return false;
        }
        self.server = ServerProcess {
            pid: Some(pid),
            expected_running: true,
            started_at: Some(self.clock.now()),
        };
        info!(pid, "adopted running server process");
        true
    }

    /// One sequencer tick: advance the active sequence, or evaluate the
    /// crash and auto-restart policies when idle.
    pub async fn tick(&mut self) -> Result<()> {
        if self.state.is_idle() {
            self.evaluate_policies().await
        } else {
            self.advance().await
        }
    }

    /// Claims a due save backup. The returned future copies the save
    /// directory and reports the result as a notice; it does not borrow the
    /// sequencer, so callers spawn it after releasing their lock.
    pub fn due_backup(&mut self) -> Option<impl Future<Output = ()> + Send + 'static> {
        let run = self.backup.begin_if_due(self.clock.now())?;
        let notices = self.notices.clone();
        let clock = self.clock.clone();
        Some(async move {
            match run.run(clock.as_ref()).await {
                Ok(target) => publish(
                    &notices,
                    NoticeLevel::Success,
                    format!("save backup completed: {}", target.display()),
                ),
                Err(err) => publish(
                    &notices,
                    NoticeLevel::Error,
                    format!("save backup failed: {err}"),
                ),
            }
        })
    }

    async fn advance(&mut self) -> Result<()> {
        let step = transition(self.state);
        match step.action {
            Action::None | Action::Wait => {
                self.state = step.next;
                Ok(())
            }
            Action::Announce(message) => {
                let api = self.require_sequence_api()?;
                self.notify(NoticeLevel::Command, format!("broadcast {message}"));
                match api.announce(&message).await {
                    Ok(_) => {
                        self.state = step.next;
                        Ok(())
                    }
                    Err(err) => Err(self.abort_with(err)),
                }
            }
            Action::Shutdown { restarting } => {
                let api = self.require_sequence_api()?;
                let message = if restarting {
                    restart_message(0)
                } else {
                    shutdown_message(0)
                };
                self.notify(NoticeLevel::Command, "shutdown".to_string());
                match api.shutdown(SHUTDOWN_WAIT_SECONDS, &message).await {
                    Ok(_) => {
                        self.mark_stopped();
                        self.notify(NoticeLevel::Success, "shutdown command sent".to_string());
                        self.state = step.next;
                        Ok(())
                    }
                    Err(err) => Err(self.abort_with(err)),
                }
            }
            Action::Launch => match self.launch_server().await {
                Ok(_) => {
                    self.state = step.next;
                    Ok(())
                }
                Err(err) => Err(self.abort_with(Error::new(
                    ErrorKind::SequenceAborted,
                    format!("relaunch failed: {err}"),
                ))),
            },
            Action::VerifyConnection => {
                self.state = step.next;
                let Some(connection) = self.connection.clone() else {
                    let err = Error::not_connected();
                    self.notify(NoticeLevel::Error, format!("reconnect failed: {err}"));
                    return Err(err);
                };
                self.test_connection(connection).await.map(|_| ())
            }
        }
    }

    fn require_sequence_api(&mut self) -> Result<Arc<dyn AdminApi>> {
        match self.require_api() {
            Ok(api) => Ok(api),
            Err(err) => Err(self.abort_with(err)),
        }
    }

    /// Resets to `Idle`, drops connection trust and reports why.
    fn abort_with(&mut self, cause: Error) -> Error {
        let label = self.state.label();
        self.state = SequencerState::Idle;
        self.connected = false;
        let err = Error::new(cause.kind, format!("{label} aborted: {}", cause.detail));
        warn!(error = %err, "sequence aborted");
        self.notify(NoticeLevel::Error, err.to_string());
        err
    }

    async fn evaluate_policies(&mut self) -> Result<()> {
        if let Some(pid) = self.server.pid {
            if self.server.expected_running && !self.supervisor.is_alive(pid).await {
                self.mark_stopped();
                if self.policy.crash_detection {
                    self.notify(
                        NoticeLevel::Error,
                        format!("server process {pid} crashed, restarting"),
                    );
                    self.launch_server().await?;
                } else {
                    self.notify(NoticeLevel::Error, format!("server process {pid} stopped"));
                }
                return Ok(());
            }
        }

        if self.auto_restart_due() {
            self.notify(
                NoticeLevel::Info,
                "auto-restart conditions met, starting restart countdown".to_string(),
            );
            self.begin_restart()?;
        }
        Ok(())
    }

    fn auto_restart_due(&self) -> bool {
        if !self.policy.auto_restart || !self.server.expected_running {
            return false;
        }
        let Some(started_at) = self.server.started_at else {
            return false;
        };
        if self.clock.now().saturating_sub(started_at) <= self.policy.auto_restart_after_secs {
            return false;
        }
        if !self.connected {
            debug!("auto-restart due but the REST API is not connected");
            return false;
        }
        !self.policy.auto_restart_player_gate
            || self.players.len() <= self.policy.auto_restart_player_limit
    }

    fn mark_stopped(&mut self) {
        self.server.expected_running = false;
        self.server.started_at = None;
    }

    async fn launch_server(&mut self) -> Result<u32> {
        let options = self.policy.launch.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, "server launch options are not configured")
        })?;
        let command = options.command_line()?;
        self.notify(NoticeLevel::Command, format!("launch {command}"));
        let pid = match self.supervisor.launch(&command).await {
            Ok(pid) => pid,
            Err(err) => {
                self.notify(NoticeLevel::Error, format!("failed to launch server: {err}"));
                return Err(err);
            }
        };
        self.server = ServerProcess {
            pid: Some(pid),
            expected_running: true,
            started_at: Some(self.clock.now()),
        };
        self.players = PlayerList::default();
        self.notify(NoticeLevel::Success, format!("server started with pid {pid}"));
        Ok(pid)
    }

    pub async fn start_server(&mut self) -> Result<u32> {
        if let Some(pid) = self.server.pid {
            if self.server.expected_running && self.supervisor.is_alive(pid).await {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("server already running with pid {pid}"),
                ));
            }
        }
        self.launch_server().await
    }

    pub async fn kill_server(&mut self) -> Result<()> {
        let pid = self
            .server
            .pid
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no server process is tracked"))?;
        self.notify(NoticeLevel::Command, format!("kill {pid}"));
        self.supervisor.kill_tree(pid).await?;
        self.mark_stopped();
        self.server.pid = None;
        self.notify(NoticeLevel::Success, "server process killed".to_string());
        Ok(())
    }

    pub fn begin_restart(&mut self) -> Result<()> {
        self.require_api()?;
        self.replace_sequence(SequencerState::CountingDownRestart {
            ticks_remaining: RESTART_COUNTDOWN_TICKS,
        });
        Ok(())
    }

    pub fn begin_shutdown_countdown(&mut self, seconds: u32) -> Result<()> {
        if !(MIN_SHUTDOWN_COUNTDOWN_SECS..=MAX_SHUTDOWN_COUNTDOWN_SECS).contains(&seconds) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "countdown must be within {MIN_SHUTDOWN_COUNTDOWN_SECS}..={MAX_SHUTDOWN_COUNTDOWN_SECS} seconds"
                ),
            ));
        }
        self.require_api()?;
        self.replace_sequence(SequencerState::CountingDownShutdown {
            ticks_remaining: seconds + 1,
        });
        Ok(())
    }

    fn replace_sequence(&mut self, state: SequencerState) {
        if !self.state.is_idle() {
            info!(previous = self.state.label(), "replacing active sequence");
        }
        self.state = state;
        self.notify(NoticeLevel::Info, format!("{} started", state.label()));
    }

    /// Cancels the active sequence, returning the state it was in.
    pub fn abort(&mut self) -> Option<SequencerState> {
        if self.state.is_idle() {
            return None;
        }
        let previous = self.state;
        self.state = SequencerState::Idle;
        self.notify(NoticeLevel::Info, format!("{} cancelled", previous.label()));
        Some(previous)
    }

    pub async fn test_connection(&mut self, connection: Connection) -> Result<ServerInfo> {
        match probe_connection(self.connector.as_ref(), &connection).await {
            Ok(established) => {
                if established.used_fallback {
                    self.notify(
                        NoticeLevel::Info,
                        "authenticated with a default admin password".to_string(),
                    );
                }
                self.api = Some(established.api);
                self.connection = Some(established.connection);
                self.connected = true;
                self.server_info = Some(established.info.clone());
                self.notify(NoticeLevel::Success, "REST API connected".to_string());
                Ok(established.info)
            }
            Err(err) => {
                self.connected = false;
                self.notify(NoticeLevel::Error, format!("REST API connection failed: {err}"));
                Err(err)
            }
        }
    }

    fn require_api(&self) -> Result<Arc<dyn AdminApi>> {
        match (&self.api, self.connected) {
            (Some(api), true) => Ok(Arc::clone(api)),
            _ => Err(Error::not_connected()),
        }
    }

    async fn call<F, Fut>(&mut self, command: String, op: F) -> ApiResult
    where
        F: FnOnce(Arc<dyn AdminApi>) -> Fut,
        Fut: Future<Output = ApiResult>,
    {
        let api = self.require_api()?;
        self.notify(NoticeLevel::Command, command);
        match op(api).await {
            Ok(payload) => {
                self.notify(NoticeLevel::Success, "command succeeded".to_string());
                Ok(payload)
            }
            Err(err) => {
                self.connected = false;
                self.notify(NoticeLevel::Error, err.to_string());
                Err(err)
            }
        }
    }

    pub async fn announce(&mut self, message: &str) -> ApiResult {
        self.call(format!("broadcast {message}"), |api| async move {
            api.announce(message).await
        })
        .await
    }

    pub async fn kick_player(&mut self, user_id: &str) -> ApiResult {
        self.call(format!("kick {user_id}"), |api| async move {
            api.kick_player(user_id).await
        })
        .await
    }

    pub async fn ban_player(&mut self, user_id: &str) -> ApiResult {
        self.call(format!("ban {user_id}"), |api| async move {
            api.ban_player(user_id).await
        })
        .await
    }

    pub async fn unban_player(&mut self, user_id: &str) -> ApiResult {
        self.call(format!("unban {user_id}"), |api| async move {
            api.unban_player(user_id).await
        })
        .await
    }

    pub async fn save_world(&mut self) -> ApiResult {
        self.call("save".to_string(), |api| async move { api.save_world().await })
            .await
    }

    pub async fn stop_server(&mut self) -> ApiResult {
        let message = shutdown_message(SHUTDOWN_WAIT_SECONDS);
        let payload = self
            .call("shutdown".to_string(), |api| async move {
                api.shutdown(SHUTDOWN_WAIT_SECONDS, &message).await
            })
            .await?;
        self.mark_stopped();
        Ok(payload)
    }

    pub async fn refresh_players(&mut self) -> Result<PlayerList> {
        let api = self.require_api()?;
        let players = match api.get_players().await {
            Ok(payload) => PlayerList::from_payload(&payload)?,
            Err(err) => {
                self.connected = false;
                error!(error = %err, "failed to refresh player list");
                return Err(err);
            }
        };
        debug!(count = players.len(), "player list refreshed");
        self.players = players.clone();
        Ok(players)
    }

    pub async fn run_command(&mut self, input: &str) -> ApiResult {
        match AdminCommand::parse(input)? {
            AdminCommand::Broadcast(message) => self.announce(&message).await,
            AdminCommand::Kick(user_id) => self.kick_player(&user_id).await,
            AdminCommand::Ban(user_id) => self.ban_player(&user_id).await,
            AdminCommand::Unban(user_id) => self.unban_player(&user_id).await,
            AdminCommand::Save => self.save_world().await,
            AdminCommand::Shutdown => self.stop_server().await,
        }
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        publish(&self.notices, level, message);
    }
}

fn publish(notices: &broadcast::Sender<Notice>, level: NoticeLevel, message: String) {
    match level {
        NoticeLevel::Error => warn!(%message, "notice"),
        _ => info!(%message, "notice"),
    }
    let _ = notices.send(Notice { level, message });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_schedule(mut state: SequencerState) -> Vec<Action> {
        let mut actions = Vec::new();
        loop {
            let step = transition(state);
            actions.push(step.action);
            state = step.next;
            if state.is_idle() {
                return actions;
            }
        }
    }

    #[test]
    fn restart_schedule_matches_tick_contract() {
        let actions = run_schedule(SequencerState::CountingDownRestart {
            ticks_remaining: RESTART_COUNTDOWN_TICKS,
        });
        assert_eq!(actions.len(), 31);
        assert_eq!(actions[0], Action::Announce(restart_message(10)));
        assert_eq!(actions[9], Action::Announce(restart_message(1)));
        assert_eq!(actions[10], Action::Shutdown { restarting: true });
        assert!(actions[11..20].iter().all(|action| *action == Action::Wait));
        assert_eq!(actions[20], Action::Launch);
        assert!(actions[21..30].iter().all(|action| *action == Action::Wait));
        assert_eq!(actions[30], Action::VerifyConnection);
    }

    #[test]
    fn shutdown_schedule_announces_each_second() {
        let actions = run_schedule(SequencerState::CountingDownShutdown { ticks_remaining: 11 });
        assert_eq!(actions.len(), 11);
        assert_eq!(actions[0], Action::Announce(shutdown_message(10)));
        assert_eq!(actions[10], Action::Shutdown { restarting: false });
    }

    #[test]
    fn idle_is_a_fixed_point() {
        let step = transition(SequencerState::Idle);
        assert_eq!(step.action, Action::None);
        assert_eq!(step.next, SequencerState::Idle);
    }

    #[test]
    fn parses_console_commands() {
        assert_eq!(
            AdminCommand::parse("Broadcast hello  world").unwrap(),
            AdminCommand::Broadcast("hello  world".to_string())
        );
        assert_eq!(
            AdminCommand::parse("KickPlayer steam_7656").unwrap(),
            AdminCommand::Kick("steam_7656".to_string())
        );
        assert_eq!(AdminCommand::parse("shutdown").unwrap(), AdminCommand::Shutdown);
        assert_eq!(AdminCommand::parse(" save ").unwrap(), AdminCommand::Save);
        assert_eq!(
            AdminCommand::parse("banplayer").unwrap_err().kind,
            ErrorKind::BadRequest
        );
        assert_eq!(
            AdminCommand::parse("teleport a b").unwrap_err().kind,
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn state_serializes_with_tag() {
        let value = serde_json::to_value(SequencerState::CountingDownRestart { ticks_remaining: 4 })
            .unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "state": "counting_down_restart", "ticks_remaining": 4 })
        );
    }
}
