use crate::clock::Clock;
use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};
use tracing::{info, warn};

const BACKUP_DIR_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day] [hour]-[minute]-[second]");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Directory copied on every run, normally `<server dir>/Pal/Saved`.
    pub source_dir: PathBuf,
    pub backup_root: PathBuf,
}

/// Interval-driven save backups. A run is claimed with
/// [`AutoBackup::begin_if_due`] and copied by [`BackupRun::run`] off the
/// caller's lock. The claim time gates the next run and only one run is in
/// flight at a time, so a slow copy never causes an overlapping backup.
#[derive(Debug, Clone)]
pub struct AutoBackup {
    policy: Option<BackupPolicy>,
    last_started_at: Option<u64>,
    progress: Arc<Mutex<BackupProgress>>,
}

#[derive(Debug, Default)]
struct BackupProgress {
    running: bool,
    last_completed_at: Option<u64>,
}

impl AutoBackup {
    pub fn disabled() -> Self {
        Self {
            policy: None,
            last_started_at: None,
            progress: Arc::default(),
        }
    }

    /// First backup becomes due one interval after `now`.
    pub fn starting_at(policy: BackupPolicy, now: u64) -> Self {
        Self {
            policy: Some(policy),
            last_started_at: Some(now),
            progress: Arc::default(),
        }
    }

    pub fn new(policy: BackupPolicy) -> Self {
        Self {
            policy: Some(policy),
            last_started_at: None,
            progress: Arc::default(),
        }
    }

    pub fn policy(&self) -> Option<&BackupPolicy> {
        self.policy.as_ref()
    }

    pub fn set_policy(&mut self, policy: Option<BackupPolicy>) {
        self.policy = policy;
    }

    pub fn last_completed_at(&self) -> Option<u64> {
        self.progress().last_completed_at
    }

    pub fn is_running(&self) -> bool {
        self.progress().running
    }

    pub fn is_due(&self, now: u64) -> bool {
        let Some(policy) = self.policy.as_ref().filter(|policy| policy.enabled) else {
            return false;
        };
        if self.is_running() {
            return false;
        }
        match self.last_started_at {
            Some(last) => now >= last.saturating_add(policy.interval_secs),
            None => true,
        }
    }

    /// Claims the next backup when one is due. The attempt is recorded
    /// immediately, so a failed copy still waits a full interval.
    pub fn begin_if_due(&mut self, now: u64) -> Option<BackupRun> {
        if !self.is_due(now) {
            return None;
        }
        let policy = self.policy.clone()?;
        self.last_started_at = Some(now);
        self.progress().running = true;
        Some(BackupRun {
            source: policy.source_dir,
            target: policy.backup_root.join(backup_dir_name(now)),
            progress: self.progress.clone(),
        })
    }

    fn progress(&self) -> MutexGuard<'_, BackupProgress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A claimed backup. Dropping it without running releases the claim.
#[derive(Debug)]
pub struct BackupRun {
    source: PathBuf,
    target: PathBuf,
    progress: Arc<Mutex<BackupProgress>>,
}

impl BackupRun {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Copies the save directory and returns the directory written.
    pub async fn run(self, clock: &dyn Clock) -> Result<PathBuf> {
        let result = copy_tree(self.source.clone(), self.target.clone()).await;
        match result {
            Ok(()) => {
                if let Ok(mut progress) = self.progress.lock() {
                    progress.last_completed_at = Some(clock.now());
                }
                info!(target = %self.target.display(), "save backup completed");
                Ok(self.target.clone())
            }
            Err(err) => {
                warn!(error = %err, "save backup failed");
                Err(err)
            }
        }
    }
}

impl Drop for BackupRun {
    fn drop(&mut self) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.running = false;
        }
    }
}

pub fn backup_dir_name(epoch_seconds: u64) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timestamp = i64::try_from(epoch_seconds)
        .ok()
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset);
    timestamp
        .format(BACKUP_DIR_FORMAT)
        .unwrap_or_else(|_| epoch_seconds.to_string())
}

pub fn save_dir_for(server_exe: &Path) -> PathBuf {
    server_exe
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("Pal")
        .join("Saved")
}

async fn copy_tree(source: PathBuf, target: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || copy_tree_blocking(&source, &target))
        .await
        .map_err(|err| Error::new(ErrorKind::Io, format!("backup task failed: {err}")))?
}

fn copy_tree_blocking(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("save directory not found: {}", source.display()),
        ));
    }
    std::fs::create_dir_all(target).map_err(|err| Error::io("failed to create backup dir", err))?;
    let entries =
        std::fs::read_dir(source).map_err(|err| Error::io("failed to read save dir", err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("failed to read save dir entry", err))?;
        let path = entry.path();
        let destination = target.join(entry.file_name());
        if path.is_dir() {
            copy_tree_blocking(&path, &destination)?;
        } else {
            std::fs::copy(&path, &destination)
                .map_err(|err| Error::io("failed to copy save file", err))?;
        }
    }
    Ok(())
}
