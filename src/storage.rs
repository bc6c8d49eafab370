use crate::backup::{save_dir_for, BackupPolicy};
use crate::launch::{LaunchOptions, MAX_PLAYERS, MIN_PLAYERS};
use crate::lifecycle::LifecyclePolicy;
use crate::mods::ModEntry;
use crate::rest_api::{Connection, MAX_PORT, MIN_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_INTERVAL_SECS: u64 = 600;
pub const MAX_INTERVAL_SECS: u64 = 86_400;
pub const MAX_RESTART_PLAYER_LIMIT: usize = 128;

/// Settings of the manager itself, persisted as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub server_exe: String,
    pub game_port: u16,
    pub game_public_port: u16,
    pub game_player_limit: u32,
    pub api_addr: String,
    pub api_port: u16,
    pub api_password: String,
    pub crash_detection: bool,
    pub auto_restart: bool,
    pub auto_restart_interval_secs: u64,
    pub auto_restart_player_gate: bool,
    pub auto_restart_player_limit: usize,
    pub launch_options_enabled: bool,
    pub launch_options: String,
    pub auto_backup: bool,
    pub auto_backup_interval_secs: u64,
    pub backup_dir: String,
    /// Pid of the last launched server, re-adopted on startup when alive.
    pub server_pid: Option<u32>,
    /// Set once the external mod authorization has been completed.
    pub mods_authorized: bool,
    pub mod_unpack_program: String,
    pub installed_mods: Vec<ModEntry>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            server_exe: String::new(),
            game_port: 8211,
            game_public_port: 25575,
            game_player_limit: 32,
            api_addr: "127.0.0.1".to_string(),
            api_port: 8212,
            api_password: String::new(),
            crash_detection: false,
            auto_restart: false,
            auto_restart_interval_secs: 7200,
            auto_restart_player_gate: false,
            auto_restart_player_limit: 0,
            launch_options_enabled: false,
            launch_options: String::new(),
            auto_backup: false,
            auto_backup_interval_secs: 3600,
            backup_dir: String::new(),
            server_pid: None,
            mods_authorized: false,
            mod_unpack_program: "tar".to_string(),
            installed_mods: Vec::new(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("game_port", self.game_port),
            ("game_public_port", self.game_public_port),
            ("api_port", self.api_port),
        ] {
            if !(MIN_PORT..=MAX_PORT).contains(&value) {
                return Err(format!("{field} must be within {MIN_PORT}..={MAX_PORT}"));
            }
        }
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.game_player_limit) {
            return Err(format!(
                "game_player_limit must be within {MIN_PLAYERS}..={MAX_PLAYERS}"
            ));
        }
        for (field, value) in [
            ("auto_restart_interval_secs", self.auto_restart_interval_secs),
            ("auto_backup_interval_secs", self.auto_backup_interval_secs),
        ] {
            if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&value) {
                return Err(format!(
                    "{field} must be within {MIN_INTERVAL_SECS}..={MAX_INTERVAL_SECS}"
                ));
            }
        }
        if self.auto_restart_player_limit > MAX_RESTART_PLAYER_LIMIT {
            return Err(format!(
                "auto_restart_player_limit must be at most {MAX_RESTART_PLAYER_LIMIT}"
            ));
        }
        if self.api_addr.trim().is_empty() {
            return Err("api_addr must not be empty".to_string());
        }
        if self.auto_backup && self.backup_dir.trim().is_empty() {
            return Err("backup_dir must be set when auto_backup is enabled".to_string());
        }
        if self.mod_unpack_program.trim().is_empty() {
            return Err("mod_unpack_program must not be empty".to_string());
        }
        Ok(())
    }

    pub fn server_exe_path(&self) -> Option<PathBuf> {
        let trimmed = self.server_exe.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    pub fn server_dir(&self) -> Option<PathBuf> {
        let server_exe = self.server_exe_path()?;
        Some(
            server_exe
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        )
    }

    pub fn launch_options(&self) -> Option<LaunchOptions> {
        let server_exe = self.server_exe_path()?;
        let extra_args = (self.launch_options_enabled && !self.launch_options.trim().is_empty())
            .then(|| self.launch_options.clone());
        Some(LaunchOptions {
            server_exe: server_exe.to_string_lossy().to_string(),
            game_port: self.game_port,
            public_port: self.game_public_port,
            player_limit: self.game_player_limit,
            extra_args,
        })
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            crash_detection: self.crash_detection,
            auto_restart: self.auto_restart,
            auto_restart_after_secs: self.auto_restart_interval_secs,
            auto_restart_player_gate: self.auto_restart_player_gate,
            auto_restart_player_limit: self.auto_restart_player_limit,
            launch: self.launch_options(),
        }
    }

    pub fn backup_policy(&self) -> Option<BackupPolicy> {
        let server_exe = self.server_exe_path()?;
        let backup_dir = self.backup_dir.trim();
        if backup_dir.is_empty() {
            return None;
        }
        Some(BackupPolicy {
            enabled: self.auto_backup,
            interval_secs: self.auto_backup_interval_secs,
            source_dir: save_dir_for(&server_exe),
            backup_root: PathBuf::from(backup_dir),
        })
    }

    /// Connection from the manually entered API fields.
    pub fn connection(&self) -> Result<Connection, String> {
        Connection::new(self.api_addr.trim(), self.api_port, self.api_password.clone())
            .map_err(|err| err.to_string())
    }
}

pub fn base_dir() -> PathBuf {
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata).join("palserver-admin");
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("palserver-admin");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("palserver-admin");
    }
    PathBuf::from("palserver-admin-data")
}

pub fn config_path() -> PathBuf {
    base_dir().join("config.json")
}

pub async fn load_config(path: &Path) -> Result<ManagerConfig, String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|err| format!("failed to parse config: {err}")),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ManagerConfig::default()),
        Err(err) => Err(format!("failed to read config: {err}")),
    }
}

pub async fn save_config(path: &Path, config: &ManagerConfig) -> Result<(), String> {
    let data = serde_json::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config: {err}"))?;
    write_replacing(path, data)
        .await
        .map_err(|err| format!("failed to write config: {err}"))
}

/// Writes `contents` to a `.tmp` sibling, then swaps it in for `path`.
pub async fn write_replacing(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, contents).await?;

    if tokio::fs::metadata(path).await.is_ok() {
        tokio::fs::remove_file(path).await?;
    }
    tokio::fs::rename(&tmp_path, path).await
}
