//! Mod installation jobs.
//!
//! Downloading and unpacking archives is delegated to a [`ModInstaller`];
//! this module sequences install/uninstall operations on a spawned task,
//! reports progress over an mpsc channel and resolves a single outcome.
//! [`HttpModInstaller`] fetches with reqwest and hands extraction to an
//! external archive tool.

use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One downloadable archive and where its contents land, relative to the
/// server directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModFile {
    #[serde(rename = "ModName")]
    pub name: String,
    #[serde(rename = "DownloadUrl", default)]
    pub download_url: String,
    #[serde(rename = "InstallLocation")]
    pub install_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModEntry {
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
    #[serde(flatten)]
    pub file: ModFile,
    /// Mods sharing a group are mutually exclusive.
    #[serde(rename = "Array", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<serde_json::Value>,
    #[serde(rename = "data", default)]
    pub extra_files: Vec<ModFile>,
}

impl ModEntry {
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.file.name
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModOperation {
    Install(ModEntry),
    Uninstall(ModEntry),
}

impl ModOperation {
    fn entry(&self) -> &ModEntry {
        match self {
            ModOperation::Install(entry) | ModOperation::Uninstall(entry) => entry,
        }
    }
}

#[async_trait::async_trait]
pub trait ModInstaller: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
    async fn unpack(&self, bytes: Vec<u8>, target_dir: &Path) -> Result<()>;
}

/// External authorization required before mods may be installed.
#[async_trait::async_trait]
pub trait AuthorizationGate: Send + Sync {
    async fn check_cached(&self) -> bool;
    fn run_interactive_flow(&self, on_success: Box<dyn FnOnce() + Send>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Installing,
    Uninstalling,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallProgress {
    pub stage: InstallStage,
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub percent: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallOutcome {
    pub succeeded: usize,
    pub failed: Vec<(String, String)>,
    /// Installed mods once the job has finished.
    pub installed: Vec<ModEntry>,
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs immediately when the cached check passes, otherwise hands `proceed`
/// to the interactive flow. Returns whether `proceed` ran synchronously.
pub async fn with_authorization(
    gate: &dyn AuthorizationGate,
    proceed: Box<dyn FnOnce() + Send>,
) -> bool {
    if gate.check_cached().await {
        proceed();
        return true;
    }
    info!("mod authorization required, starting interactive flow");
    gate.run_interactive_flow(proceed);
    false
}

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const ARCHIVE_FILE: &str = "download.archive";

/// Downloads mod archives over HTTP and unpacks them by running
/// `<program> -xf <archive> -C <target>`.
pub struct HttpModInstaller {
    client: reqwest::Client,
    unpack_program: String,
}

impl HttpModInstaller {
    pub fn new(unpack_program: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|err| Error::new(ErrorKind::Unknown, format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            unpack_program: unpack_program.into(),
        })
    }
}

#[async_trait::async_trait]
impl ModInstaller for HttpModInstaller {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|err| {
            let kind = if err.is_timeout() {
                ErrorKind::Timeout
            } else {
                ErrorKind::ConnectionFailed
            };
            Error::new(kind, format!("download failed: {err}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::new(
                ErrorKind::HttpError,
                format!("{}: {url}", status.as_u16()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Error::new(ErrorKind::ConnectionFailed, format!("download interrupted: {err}")))?;
        Ok(bytes.to_vec())
    }

    async fn unpack(&self, bytes: Vec<u8>, target_dir: &Path) -> Result<()> {
        let archive = target_dir.join(ARCHIVE_FILE);
        tokio::fs::write(&archive, bytes)
            .await
            .map_err(|err| Error::io("failed to write mod archive", err))?;

        let output = Command::new(&self.unpack_program)
            .arg("-xf")
            .arg(&archive)
            .arg("-C")
            .arg(target_dir)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&archive).await;

        let output = output.map_err(|err| Error::io("failed to run archive tool", err))?;
        if !output.status.success() {
            return Err(Error::new(
                ErrorKind::Io,
                format!(
                    "{} exited with {}: {}",
                    self.unpack_program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}

pub struct ModJob {
    installer: Arc<dyn ModInstaller>,
    game_dir: PathBuf,
    staging_dir: PathBuf,
    installed: Vec<ModEntry>,
}

impl ModJob {
    pub fn new(installer: Arc<dyn ModInstaller>, game_dir: PathBuf, installed: Vec<ModEntry>) -> Self {
        Self {
            installer,
            game_dir,
            staging_dir: std::env::temp_dir().join("palserver-admin-mods"),
            installed,
        }
    }

    pub fn with_staging_dir(mut self, staging_dir: PathBuf) -> Self {
        self.staging_dir = staging_dir;
        self
    }

    /// Spawns the job. Progress arrives on the receiver; the handle resolves
    /// once every operation has been attempted.
    pub fn spawn(
        self,
        operations: Vec<ModOperation>,
    ) -> (mpsc::Receiver<InstallProgress>, JoinHandle<InstallOutcome>) {
        let (sender, receiver) = mpsc::channel(32);
        let handle = tokio::spawn(async move { self.run(operations, sender).await });
        (receiver, handle)
    }

    async fn run(
        mut self,
        operations: Vec<ModOperation>,
        progress: mpsc::Sender<InstallProgress>,
    ) -> InstallOutcome {
        let total = operations.len();
        let mut outcome = InstallOutcome::default();

        for (index, operation) in operations.iter().enumerate() {
            let name = operation.entry().label().to_string();
            let stage = match operation {
                ModOperation::Install(_) => InstallStage::Installing,
                ModOperation::Uninstall(_) => InstallStage::Uninstalling,
            };
            let _ = progress
                .send(InstallProgress {
                    stage,
                    index: index + 1,
                    total,
                    name: name.clone(),
                    percent: percent(index, total),
                })
                .await;

            let result = match operation {
                ModOperation::Install(entry) => self.install(entry).await,
                ModOperation::Uninstall(entry) => self.uninstall(entry).await,
            };
            match result {
                Ok(()) => {
                    info!(mod_name = %name, ?stage, "mod operation completed");
                    outcome.succeeded += 1;
                }
                Err(err) => {
                    warn!(mod_name = %name, error = %err, "mod operation failed");
                    outcome.failed.push((name, err.to_string()));
                }
            }
        }

        if let Err(err) = tokio::fs::remove_dir_all(&self.staging_dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %err, "failed to clean mod staging dir");
            }
        }

        let _ = progress
            .send(InstallProgress {
                stage: InstallStage::Finished,
                index: total,
                total,
                name: String::new(),
                percent: 100,
            })
            .await;
        outcome.installed = std::mem::take(&mut self.installed);
        outcome
    }

    async fn install(&mut self, entry: &ModEntry) -> Result<()> {
        require_complete(&entry.file, true)?;

        if let Some(group) = entry.group.as_ref() {
            let conflicting: Vec<ModEntry> = self
                .installed
                .iter()
                .filter(|installed| installed.group.as_ref() == Some(group))
                .cloned()
                .collect();
            for installed in conflicting {
                info!(mod_name = %installed.label(), "removing mod from the same group");
                self.uninstall(&installed).await?;
            }
        }

        self.install_file(&entry.file).await?;
        for extra in &entry.extra_files {
            if require_complete(extra, true).is_ok() {
                self.install_file(extra).await?;
            }
        }
        self.installed.push(entry.clone());
        Ok(())
    }

    async fn install_file(&self, file: &ModFile) -> Result<()> {
        let bytes = self.installer.fetch(&file.download_url).await?;
        let staging = self.staging_dir.join(&file.name);
        if tokio::fs::metadata(&staging).await.is_ok() {
            tokio::fs::remove_dir_all(&staging)
                .await
                .map_err(|err| Error::io("failed to clear staging dir", err))?;
        }
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|err| Error::io("failed to create staging dir", err))?;
        self.installer.unpack(bytes, &staging).await?;

        let target = self.game_dir.join(&file.install_location);
        tokio::task::spawn_blocking(move || replace_into(&staging, &target))
            .await
            .map_err(|err| Error::new(ErrorKind::Io, format!("install task failed: {err}")))?
    }

    async fn uninstall(&mut self, entry: &ModEntry) -> Result<()> {
        require_complete(&entry.file, false)?;
        let install_dir = self.game_dir.join(&entry.file.install_location);
        let path = install_dir.join(&entry.file.name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|err| Error::io("failed to remove mod dir", err))?,
            Ok(_) => tokio::fs::remove_file(&path)
                .await
                .map_err(|err| Error::io("failed to remove mod file", err))?,
            Err(_) => {}
        }

        if let Ok(mut entries) = tokio::fs::read_dir(&install_dir).await {
            if let Ok(None) = entries.next_entry().await {
                let _ = tokio::fs::remove_dir(&install_dir).await;
            }
        }
        self.installed.retain(|installed| installed.file != entry.file);
        Ok(())
    }
}

fn require_complete(file: &ModFile, needs_url: bool) -> Result<()> {
    if file.name.trim().is_empty()
        || file.install_location.trim().is_empty()
        || (needs_url && file.download_url.trim().is_empty())
    {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("incomplete mod metadata for '{}'", file.name),
        ));
    }
    Ok(())
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total).min(100) as u8
}

/// Copies each top-level item of `source` into `target`, replacing items
/// with the same name.
fn replace_into(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|err| Error::io("failed to create install dir", err))?;
    let entries = std::fs::read_dir(source).map_err(|err| Error::io("failed to read staging dir", err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("failed to read staging entry", err))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if to.is_dir() {
            std::fs::remove_dir_all(&to).map_err(|err| Error::io("failed to replace dir", err))?;
        } else if to.exists() {
            std::fs::remove_file(&to).map_err(|err| Error::io("failed to replace file", err))?;
        }
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|err| Error::io("failed to copy mod file", err))?;
        }
    }
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to).map_err(|err| Error::io("failed to create dir", err))?;
    for entry in std::fs::read_dir(from).map_err(|err| Error::io("failed to read dir", err))? {
        let entry = entry.map_err(|err| Error::io("failed to read dir entry", err))?;
        let path = entry.path();
        let dest = to.join(entry.file_name());
        if path.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            std::fs::copy(&path, &dest).map_err(|err| Error::io("failed to copy file", err))?;
        }
    }
    Ok(())
}
