use crate::error::{Error, ErrorKind, Result};
use crate::launch::CommandLine;
use std::{collections::VecDeque, path::Path, sync::Arc};
use sysinfo::{Pid, System};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    sync::{broadcast, Mutex},
};
use tracing::{info, warn};

const MAX_CONSOLE_LINES: usize = 500;

/// Launches and watches the dedicated server process.
#[async_trait::async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn launch(&self, command: &CommandLine) -> Result<u32>;
    async fn is_alive(&self, pid: u32) -> bool;
    async fn kill_tree(&self, pid: u32) -> Result<()>;
}

/// Supervisor for a server started on this machine. Console output of the
/// launched process is kept in a ring buffer and re-broadcast line by line.
#[derive(Clone)]
pub struct LocalSupervisor {
    inner: Arc<Mutex<SupervisorInner>>,
    sender: broadcast::Sender<String>,
}

struct SupervisorInner {
    child: Option<Child>,
    pid: Option<u32>,
    buffer: VecDeque<String>,
    system: System,
}

impl LocalSupervisor {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(200);
        let inner = SupervisorInner {
            child: None,
            pid: None,
            buffer: VecDeque::new(),
            system: System::new(),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    pub async fn tail(&self, limit: usize) -> Vec<String> {
        let inner = self.inner.lock().await;
        let start = inner.buffer.len().saturating_sub(limit);
        inner.buffer.iter().skip(start).cloned().collect()
    }

    async fn push_line(&self, line: String) {
        {
            let mut inner = self.inner.lock().await;
            if inner.buffer.len() >= MAX_CONSOLE_LINES {
                inner.buffer.pop_front();
            }
            inner.buffer.push_back(line.clone());
        }
        let _ = self.sender.send(line);
    }
}

impl Default for LocalSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProcessSupervisor for LocalSupervisor {
    async fn launch(&self, command_line: &CommandLine) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        if let Some(child) = inner.child.as_mut() {
            if let Ok(None) = child.try_wait() {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("server already running with pid {}", inner.pid.unwrap_or_default()),
                ));
            }
        }

        let mut command = Command::new(&command_line.program);
        command
            .args(&command_line.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(dir) = Path::new(&command_line.program).parent() {
            if !dir.as_os_str().is_empty() {
                command.current_dir(dir);
            }
        }

        let mut child = command
            .spawn()
            .map_err(|err| Error::io("failed to start server", err))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::new(ErrorKind::Io, "server exited before reporting a pid"))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        inner.child = Some(child);
        inner.pid = Some(pid);
        inner.buffer.clear();
        drop(inner);

        if let Some(stdout) = stdout {
            let supervisor = self.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    supervisor.push_line(line).await;
                }
            });
        }

        if let Some(stderr) = stderr {
            let supervisor = self.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    supervisor.push_line(line).await;
                }
            });
        }

        info!(pid, command = %command_line, "server process launched");
        Ok(pid)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.pid == Some(pid) {
            if let Some(child) = inner.child.as_mut() {
                return match child.try_wait() {
                    Ok(None) => true,
                    Ok(Some(status)) => {
                        info!(pid, %status, "server process exited");
                        inner.child = None;
                        inner.pid = None;
                        false
                    }
                    Err(err) => {
                        warn!(pid, error = %err, "failed to poll server process");
                        false
                    }
                };
            }
        }
        inner.system.refresh_processes();
        inner.system.process(Pid::from_u32(pid)).is_some()
    }

    /// Kills every descendant of `pid`, then `pid` itself.
    async fn kill_tree(&self, pid: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.system.refresh_processes();
        let root = Pid::from_u32(pid);
        let owned = inner.pid == Some(pid);
        if inner.system.process(root).is_none() && !owned {
            return Err(Error::new(ErrorKind::NotFound, format!("no process with pid {pid}")));
        }

        let descendants = descendants_of(&inner.system, root);
        for child_pid in descendants.iter().rev() {
            if let Some(process) = inner.system.process(*child_pid) {
                if !process.kill() {
                    warn!(pid = child_pid.as_u32(), "failed to kill child process");
                }
            }
        }

        if owned {
            let child = inner.child.take();
            inner.pid = None;
            drop(inner);
            if let Some(mut child) = child {
                child
                    .kill()
                    .await
                    .map_err(|err| Error::io("failed to kill server", err))?;
                let _ = child.wait().await;
            }
        } else if let Some(process) = inner.system.process(root) {
            if !process.kill() {
                return Err(Error::new(ErrorKind::Io, format!("failed to kill pid {pid}")));
            }
        }

        info!(pid, killed_children = descendants.len(), "server process tree killed");
        Ok(())
    }
}

/// Breadth-first list of processes below `root`.
fn descendants_of(system: &System, root: Pid) -> Vec<Pid> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && !found.contains(pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found
}
