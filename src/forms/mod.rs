use palserver_admin::mods::ModEntry;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountdownRequest {
    pub seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayerRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct SettingUpdate {
    pub key: String,
    pub value: String,
    /// Keeps the current quoting of the key when omitted.
    pub quoted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct WorldSettingsUpdate {
    pub values: Vec<SettingUpdate>,
}

#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct TailQuery {
    pub n: Option<usize>,
}

/// Uninstalls run before installs.
#[derive(Debug, Default, Deserialize)]
pub struct ModJobRequest {
    #[serde(default)]
    pub install: Vec<ModEntry>,
    #[serde(default)]
    pub uninstall: Vec<ModEntry>,
}
