#![allow(dead_code)]

use palserver_admin::error::{Error, ErrorKind, Result};
use palserver_admin::launch::{CommandLine, LaunchOptions};
use palserver_admin::rest_api::{
    AdminApi, AdminApiConnector, ApiPayload, ApiResult, Connection, GenericAck,
};
use palserver_admin::supervisor::ProcessSupervisor;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Shared behaviour and call log of every [`ScriptedApi`] built by one connector.
#[derive(Default)]
pub struct Script {
    pub calls: Mutex<Vec<String>>,
    pub accepted_passwords: Mutex<Vec<String>>,
    /// 1-based announce call that fails with `HttpError`.
    pub fail_announce_at: Mutex<Option<usize>>,
    pub players: Mutex<Value>,
    announces: Mutex<usize>,
}

impl Script {
    pub fn accepting(password: &str) -> Arc<Self> {
        let script = Self::default();
        script
            .accepted_passwords
            .lock()
            .unwrap()
            .push(password.to_string());
        *script.players.lock().unwrap() = json!({ "players": [] });
        Arc::new(script)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn set_players(&self, count: usize) {
        let players: Vec<Value> = (0..count)
            .map(|idx| json!({ "name": format!("p{idx}"), "level": 10, "userId": format!("steam_{idx}") }))
            .collect();
        *self.players.lock().unwrap() = json!({ "players": players });
    }
}

pub struct ScriptedApi {
    script: Arc<Script>,
    password: String,
}

impl ScriptedApi {
    fn record(&self, call: String) -> Result<()> {
        self.script.calls.lock().unwrap().push(call);
        let accepted = self.script.accepted_passwords.lock().unwrap();
        if accepted.iter().any(|password| *password == self.password) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::Unauthorized, "check credentials"))
        }
    }

    fn ack() -> ApiResult {
        Ok(ApiPayload::Ack(GenericAck::success()))
    }
}

#[async_trait::async_trait]
impl AdminApi for ScriptedApi {
    async fn get_server_info(&self) -> ApiResult {
        self.record(format!("info:{}", self.password))?;
        Ok(ApiPayload::Json(json!({
            "version": "v0.3.1",
            "servername": "Scripted",
            "description": "",
        })))
    }

    async fn get_players(&self) -> ApiResult {
        self.record("players".to_string())?;
        Ok(ApiPayload::Json(self.script.players.lock().unwrap().clone()))
    }

    async fn announce(&self, message: &str) -> ApiResult {
        self.record(format!("announce:{message}"))?;
        let number = {
            let mut announces = self.script.announces.lock().unwrap();
            *announces += 1;
            *announces
        };
        if *self.script.fail_announce_at.lock().unwrap() == Some(number) {
            return Err(Error::new(ErrorKind::HttpError, "500: boom"));
        }
        Self::ack()
    }

    async fn kick_player(&self, user_id: &str) -> ApiResult {
        self.record(format!("kick:{user_id}"))?;
        Self::ack()
    }

    async fn ban_player(&self, user_id: &str) -> ApiResult {
        self.record(format!("ban:{user_id}"))?;
        Self::ack()
    }

    async fn unban_player(&self, user_id: &str) -> ApiResult {
        self.record(format!("unban:{user_id}"))?;
        Self::ack()
    }

    async fn save_world(&self) -> ApiResult {
        self.record("save".to_string())?;
        Self::ack()
    }

    async fn shutdown(&self, wait_seconds: u32, _message: &str) -> ApiResult {
        self.record(format!("shutdown:{wait_seconds}"))?;
        Self::ack()
    }

    async fn stop(&self) -> ApiResult {
        self.record("stop".to_string())?;
        Self::ack()
    }
}

pub struct ScriptedConnector {
    pub script: Arc<Script>,
}

impl AdminApiConnector for ScriptedConnector {
    fn connect(&self, connection: &Connection) -> Result<Arc<dyn AdminApi>> {
        Ok(Arc::new(ScriptedApi {
            script: self.script.clone(),
            password: connection.password.clone(),
        }))
    }
}

/// In-memory process table.
#[derive(Default)]
pub struct FakeSupervisor {
    pub launches: Mutex<Vec<CommandLine>>,
    pub alive: Mutex<HashSet<u32>>,
    pub killed: Mutex<Vec<u32>>,
    pub fail_launch: Mutex<bool>,
}

impl FakeSupervisor {
    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn crash(&self, pid: u32) {
        self.alive.lock().unwrap().remove(&pid);
    }
}

#[async_trait::async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn launch(&self, command: &CommandLine) -> Result<u32> {
        if *self.fail_launch.lock().unwrap() {
            return Err(Error::new(ErrorKind::Io, "failed to start server: missing binary"));
        }
        let mut launches = self.launches.lock().unwrap();
        launches.push(command.clone());
        let pid = 1000 + launches.len() as u32;
        self.alive.lock().unwrap().insert(pid);
        Ok(pid)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    async fn kill_tree(&self, pid: u32) -> Result<()> {
        if !self.alive.lock().unwrap().remove(&pid) {
            return Err(Error::new(ErrorKind::NotFound, format!("no process with pid {pid}")));
        }
        self.killed.lock().unwrap().push(pid);
        Ok(())
    }
}

pub fn launch_options() -> LaunchOptions {
    LaunchOptions {
        server_exe: "/srv/pal/PalServer.sh".to_string(),
        game_port: 8211,
        public_port: 25575,
        player_limit: 32,
        extra_args: None,
    }
}

pub fn connection(password: &str) -> Connection {
    Connection::new("127.0.0.1", 8212, password).expect("valid connection")
}
