//! Backup orchestrator - runs one stage, upload and cleanup cycle.
//!
//! ```text
//! Idle -> Staging -> Uploading -> Cleanup -> Idle
//!            |            (dry run) ^
//!            +-> Failed ------------+
//! ```
//!
//! Only one cycle runs at a time. The staging directory is removed at the
//! end of every cycle, whatever its outcome.

use crate::config::Config;
use crate::dispatch::{BackendOutcome, UploadDispatcher};
use crate::fs::cloner::{remove_staging, CloneStats, DirectoryCloner};
use crate::fs::walker::WalkOptions;
use crate::utils::{DataVaultError, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the orchestrator is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Staging,
    Uploading,
    Cleanup,
    /// Staging failed. Kept until the next cycle starts.
    Failed,
}

/// One stage/upload/cleanup sequence
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub started_at: DateTime<Local>,
    pub label: String,
    /// `<staging root>/<label>`, removed at cycle end
    pub staging_path: PathBuf,
    pub source_path: PathBuf,
    /// Staged copy of the source, the directory handed to backends
    pub upload_path: PathBuf,
}

impl BackupRun {
    pub fn new(source: &Path, staging_root: &Path, started_at: DateTime<Local>) -> Self {
        let label = run_label(&started_at);
        let staging_path = staging_root.join(&label);
        let basename = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "source".into());
        let upload_path = staging_path.join(basename);

        Self {
            started_at,
            label,
            staging_path,
            source_path: source.to_path_buf(),
            upload_path,
        }
    }
}

/// Run label derived from local cycle start time, e.g. `backup_2024-03-01_14-05-09`
pub fn run_label(started_at: &DateTime<Local>) -> String {
    format!("backup_{}", started_at.format("%Y-%m-%d_%H-%M-%S"))
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub source: PathBuf,
    pub staging_root: PathBuf,
    pub excludes: Vec<String>,
    pub dry_run: bool,
    pub verbose: bool,
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source: config.source.clone(),
            staging_root: config.staging_root.clone(),
            excludes: config.excludes.clone(),
            dry_run: config.dry_run,
            verbose: config.verbose,
        }
    }
}

/// Result of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub label: String,
    pub success: bool,
    pub successes: usize,
    pub configured: usize,
    pub outcomes: Vec<BackendOutcome>,
    pub dry_run: bool,
    pub stats: CloneStats,
}

impl CycleReport {
    /// Turn an all-failed cycle into an error.
    pub fn ensure_success(&self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(DataVaultError::AllBackendsFailed(self.configured))
        }
    }
}

pub struct BackupOrchestrator {
    options: OrchestratorOptions,
    dispatcher: UploadDispatcher,
    run_lock: tokio::sync::Mutex<()>,
    state: Mutex<CycleState>,
}

impl BackupOrchestrator {
    pub fn new(options: OrchestratorOptions, dispatcher: UploadDispatcher) -> Self {
        Self {
            options,
            dispatcher,
            run_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn state(&self) -> CycleState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn transition(&self, next: CycleState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!("Cycle state {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Run one cycle, waiting for any cycle already in progress.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let _guard = self.run_lock.lock().await;
        self.execute(cancel).await
    }

    /// Run one cycle unless another is in progress, in which case `None`.
    pub async fn try_run_cycle(&self, cancel: &CancellationToken) -> Option<Result<CycleReport>> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.execute(cancel).await)
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let run = BackupRun::new(&self.options.source, &self.options.staging_root, Local::now());
        info!(label = %run.label, "Starting backup of {}", run.source_path.display());

        self.transition(CycleState::Staging);
        let stats = match self.stage(&run).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(label = %run.label, "Failed to stage source: {}", e);
                self.transition(CycleState::Failed);
                self.cleanup(&run);
                return Err(e);
            }
        };
        info!(
            label = %run.label,
            "Staged {} files in {} directories ({} bytes)",
            stats.files, stats.directories, stats.bytes
        );

        if cancel.is_cancelled() {
            self.transition(CycleState::Cleanup);
            self.cleanup(&run);
            self.transition(CycleState::Idle);
            return Err(DataVaultError::Cancelled);
        }

        if self.options.dry_run {
            info!(
                label = %run.label,
                "[DRY RUN] Would upload {} to {} backends",
                run.upload_path.display(),
                self.dispatcher.configured_count()
            );
            self.transition(CycleState::Cleanup);
            self.cleanup(&run);
            self.transition(CycleState::Idle);
            return Ok(CycleReport {
                label: run.label,
                success: true,
                successes: 0,
                configured: self.dispatcher.configured_count(),
                outcomes: Vec::new(),
                dry_run: true,
                stats,
            });
        }

        self.transition(CycleState::Uploading);
        let dispatch = self
            .dispatcher
            .dispatch(cancel, &run.upload_path, &run.label)
            .await;

        self.transition(CycleState::Cleanup);
        self.cleanup(&run);
        self.transition(CycleState::Idle);

        let report = CycleReport {
            label: run.label,
            success: dispatch.is_success(),
            successes: dispatch.successes(),
            configured: self.dispatcher.configured_count(),
            outcomes: dispatch.outcomes,
            dry_run: false,
            stats,
        };

        if self.options.verbose {
            for outcome in &report.outcomes {
                match &outcome.error {
                    Some(e) => info!(backend = %outcome.backend, "{}: {}", outcome.message, e),
                    None => info!(backend = %outcome.backend, "{}", outcome.message),
                }
            }
        }

        if report.success {
            info!(
                label = %report.label,
                "Backup completed: {}/{} successful uploads",
                report.successes, report.configured
            );
        } else {
            warn!(label = %report.label, "Backup failed: no backend accepted the upload");
        }

        Ok(report)
    }

    async fn stage(&self, run: &BackupRun) -> Result<CloneStats> {
        let options = WalkOptions::with_excludes(self.options.excludes.clone());
        let cloner = DirectoryCloner::new(options);
        let source = run.source_path.clone();
        let target = run.upload_path.clone();

        tokio::task::spawn_blocking(move || cloner.clone_tree(&source, &target))
            .await
            .map_err(|e| DataVaultError::Io(std::io::Error::other(e)))?
    }

    fn cleanup(&self, run: &BackupRun) {
        match remove_staging(&run.staging_path) {
            Ok(()) => debug!(
                label = %run.label,
                "Removed staging directory {}",
                run.staging_path.display()
            ),
            Err(e) => warn!(
                label = %run.label,
                "Failed to remove staging directory {}: {}",
                run.staging_path.display(),
                e
            ),
        }
    }
}
