use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::debug;

pub const API_BASE_PATH: &str = "/v1/api";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const ADMIN_USERNAME: &str = "admin";
pub const MIN_PORT: u16 = 1000;
pub const MAX_PORT: u16 = 65534;
/// Largest `waittime` the shutdown endpoint accepts.
pub const MAX_SHUTDOWN_WAIT_SECONDS: u32 = 1;

/// Address and credentials of one admin REST endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Connection {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "host must not be empty"));
        }
        validate_port(port)?;
        Ok(Self {
            host,
            port,
            username: ADMIN_USERNAME.to_string(),
            password: password.into(),
        })
    }

    pub fn with_password(&self, password: &str) -> Self {
        Self {
            password: password.to_string(),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub fn validate_port(port: u16) -> Result<()> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("port must be within {MIN_PORT}..={MAX_PORT}, got {port}"),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericAck {
    pub status: String,
    pub message: String,
}

impl GenericAck {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: "operation completed".to_string(),
        }
    }
}

/// Successful response body, normalized by content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiPayload {
    Json(Value),
    Ack(GenericAck),
    Text(String),
}

pub type ApiResult = Result<ApiPayload>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "serverName", alias = "servername")]
    pub server_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "worldGuid", alias = "worldguid")]
    pub world_guid: Option<String>,
}

impl ServerInfo {
    pub fn from_payload(payload: &ApiPayload) -> Result<Self> {
        match payload {
            ApiPayload::Json(value) => serde_json::from_value(value.clone()).map_err(|err| {
                Error::new(ErrorKind::ParseFailed, format!("invalid server info: {err}"))
            }),
            ApiPayload::Ack(_) => Ok(Self::default()),
            ApiPayload::Text(text) => Err(Error::new(
                ErrorKind::ParseFailed,
                format!("unexpected server info body: {text}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default, rename = "userId")]
    pub user_id: String,
    #[serde(default, rename = "steamId", alias = "SteamID")]
    pub steam_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerList {
    #[serde(default)]
    pub players: Vec<Player>,
}

impl PlayerList {
    pub fn from_payload(payload: &ApiPayload) -> Result<Self> {
        match payload {
            ApiPayload::Json(value) => {
                let Some(entries) = value.get("players").and_then(|value| value.as_array()) else {
                    return Ok(Self::default());
                };
                let players = entries
                    .iter()
                    .filter(|entry| entry.is_object())
                    .map(|entry| serde_json::from_value(entry.clone()))
                    .collect::<std::result::Result<Vec<Player>, _>>()
                    .map_err(|err| {
                        Error::new(ErrorKind::ParseFailed, format!("invalid player entry: {err}"))
                    })?;
                Ok(Self { players })
            }
            ApiPayload::Ack(_) => Ok(Self::default()),
            ApiPayload::Text(text) => Err(Error::new(
                ErrorKind::ParseFailed,
                format!("unexpected player list body: {text}"),
            )),
        }
    }

    /// First player with `user_id`; later duplicates in the snapshot are ignored.
    pub fn find(&self, user_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Operations of the server's admin REST API.
#[async_trait::async_trait]
pub trait AdminApi: Send + Sync {
    async fn get_server_info(&self) -> ApiResult;
    async fn get_players(&self) -> ApiResult;
    async fn announce(&self, message: &str) -> ApiResult;
    async fn kick_player(&self, user_id: &str) -> ApiResult;
    async fn ban_player(&self, user_id: &str) -> ApiResult;
    async fn unban_player(&self, user_id: &str) -> ApiResult;
    async fn save_world(&self) -> ApiResult;
    async fn shutdown(&self, wait_seconds: u32, message: &str) -> ApiResult;
    async fn stop(&self) -> ApiResult;
}

/// Builds an [`AdminApi`] bound to one connection.
pub trait AdminApiConnector: Send + Sync {
    fn connect(&self, connection: &Connection) -> Result<Arc<dyn AdminApi>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl AdminApiConnector for HttpConnector {
    fn connect(&self, connection: &Connection) -> Result<Arc<dyn AdminApi>> {
        Ok(Arc::new(AdminApiClient::new(connection.clone())?))
    }
}

#[derive(Clone)]
pub struct AdminApiClient {
    connection: Connection,
    client: reqwest::Client,
}

impl AdminApiClient {
    pub fn new(connection: Connection) -> Result<Self> {
        Self::with_timeout(connection, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(connection: Connection, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::new(ErrorKind::Unknown, format!("failed to build http client: {err}")))?;
        Ok(Self { connection, client })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn request(&self, method: reqwest::Method, endpoint: &str, body: Option<Value>) -> ApiResult {
        let url = format!("{}{API_BASE_PATH}{endpoint}", self.connection.base_url());
        debug!(%method, %url, "admin api request");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.connection.username, Some(&self.connection.password))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_transport_error)?;
        classify_response(status, &text)
    }

    async fn get(&self, endpoint: &str) -> ApiResult {
        self.request(reqwest::Method::GET, endpoint, None).await
    }

    async fn post(&self, endpoint: &str, body: Option<Value>) -> ApiResult {
        self.request(reqwest::Method::POST, endpoint, body).await
    }
}

#[async_trait::async_trait]
impl AdminApi for AdminApiClient {
    async fn get_server_info(&self) -> ApiResult {
        self.get("/info").await
    }

    async fn get_players(&self) -> ApiResult {
        self.get("/players").await
    }

    async fn announce(&self, message: &str) -> ApiResult {
        self.post("/announce", Some(json!({ "message": message }))).await
    }

    async fn kick_player(&self, user_id: &str) -> ApiResult {
        self.post("/kick", Some(json!({ "userId": user_id }))).await
    }

    async fn ban_player(&self, user_id: &str) -> ApiResult {
        self.post("/ban", Some(json!({ "userId": user_id }))).await
    }

    async fn unban_player(&self, user_id: &str) -> ApiResult {
        self.post("/unban", Some(json!({ "userId": user_id }))).await
    }

    async fn save_world(&self) -> ApiResult {
        self.post("/save", None).await
    }

    /// The endpoint only understands `waittime`; `message` is not sent.
    async fn shutdown(&self, wait_seconds: u32, message: &str) -> ApiResult {
        debug!(wait_seconds, message, "shutdown message is not forwarded by the api");
        self.post("/shutdown", Some(shutdown_body(wait_seconds))).await
    }

    async fn stop(&self) -> ApiResult {
        self.post("/stop", None).await
    }
}

pub fn shutdown_body(wait_seconds: u32) -> Value {
    json!({ "waittime": wait_seconds.min(MAX_SHUTDOWN_WAIT_SECONDS) })
}

pub fn classify_response(status: u16, body: &str) -> ApiResult {
    match status {
        200 => {
            if body.trim().is_empty() {
                return Ok(ApiPayload::Ack(GenericAck::success()));
            }
            match serde_json::from_str::<Value>(body) {
                Ok(value) => Ok(ApiPayload::Json(value)),
                Err(_) => Ok(ApiPayload::Text(body.to_string())),
            }
        }
        401 => Err(Error::new(ErrorKind::Unauthorized, "check credentials")),
        400 => {
            let detail = if body.trim().is_empty() {
                "invalid request data".to_string()
            } else {
                body.to_string()
            };
            Err(Error::new(ErrorKind::BadRequest, detail))
        }
        other => Err(Error::new(ErrorKind::HttpError, format!("{other}: {body}"))),
    }
}

fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::new(ErrorKind::Timeout, format!("request timed out: {err}"))
    } else if err.is_connect() {
        Error::new(ErrorKind::ConnectionFailed, format!("unable to reach server: {err}"))
    } else {
        Error::new(ErrorKind::Unknown, err.to_string())
    }
}
