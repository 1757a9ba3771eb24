//! Upload dispatcher - fans one staged tree out to every backend.
//!
//! Every configured backend gets its own task; the dispatcher waits for all
//! of them before reporting, regardless of completion order. Unconfigured
//! backends produce their outcome immediately without any I/O.

use crate::backend::{BackendSlot, StorageBackend};
use crate::utils::{DataVaultError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Terminal state of one backend within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Cancelled,
    NotConfigured,
}

/// Recorded result for one backend within one run
#[derive(Debug, Clone, Serialize)]
pub struct BackendOutcome {
    pub backend: String,
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Local>,
}

impl BackendOutcome {
    fn new(backend: &str, status: OutcomeStatus, error: Option<String>) -> Self {
        let message = match status {
            OutcomeStatus::Succeeded => format!("{} upload successful", backend),
            OutcomeStatus::Failed => format!("{} upload failed", backend),
            OutcomeStatus::Cancelled => format!("{} upload cancelled", backend),
            OutcomeStatus::NotConfigured => format!("{} not configured", backend),
        };
        Self {
            backend: backend.to_string(),
            status,
            message,
            error,
            completed_at: Local::now(),
        }
    }

    fn from_result(backend: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::new(backend, OutcomeStatus::Succeeded, None),
            Err(e) if e.is_cancelled() => {
                Self::new(backend, OutcomeStatus::Cancelled, Some(e.to_string()))
            }
            Err(e) => Self::new(backend, OutcomeStatus::Failed, Some(e.to_string())),
        }
    }

    pub fn success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// All outcomes of one dispatch, in slot order
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<BackendOutcome>,
}

impl DispatchReport {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success()).count()
    }

    /// Backends that were actually attempted
    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status != OutcomeStatus::NotConfigured)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.successes() > 0
    }
}

/// Concurrent uploader over a fixed set of backend slots
#[derive(Debug)]
pub struct UploadDispatcher {
    slots: Vec<BackendSlot>,
}

impl UploadDispatcher {
    /// Fails with [`DataVaultError::NoBackends`] when `slots` is empty.
    pub fn new(slots: Vec<BackendSlot>) -> Result<Self> {
        if slots.is_empty() {
            return Err(DataVaultError::NoBackends);
        }
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[BackendSlot] {
        &self.slots
    }

    pub fn configured_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_configured()).count()
    }

    /// Upload `staged` to every configured backend under the run `label`.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        staged: &Path,
        label: &str,
    ) -> DispatchReport {
        let mut pending = Vec::with_capacity(self.slots.len());

        for slot in &self.slots {
            match slot {
                BackendSlot::Configured(backend) => {
                    let handle = tokio::spawn(upload_one(
                        Arc::clone(backend),
                        cancel.clone(),
                        staged.to_path_buf(),
                        label.to_string(),
                    ));
                    pending.push(Pending::Running(backend.name().to_string(), handle));
                }
                BackendSlot::NotConfigured { name, reason } => {
                    info!(backend = %name, "Skipping upload: {}", reason);
                    let mut outcome = BackendOutcome::new(name, OutcomeStatus::NotConfigured, None);
                    outcome.error = Some(reason.clone());
                    pending.push(Pending::Done(outcome));
                }
            }
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for entry in pending {
            let outcome = match entry {
                Pending::Done(outcome) => outcome,
                Pending::Running(name, handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(backend = %name, "Upload task panicked: {}", e);
                        let error = format!("upload task failed: {}", e);
                        BackendOutcome::new(&name, OutcomeStatus::Failed, Some(error))
                    }
                },
            };
            outcomes.push(outcome);
        }

        DispatchReport { outcomes }
    }
}

enum Pending {
    Running(String, tokio::task::JoinHandle<BackendOutcome>),
    Done(BackendOutcome),
}

async fn upload_one(
    backend: Arc<dyn StorageBackend>,
    cancel: CancellationToken,
    staged: PathBuf,
    label: String,
) -> BackendOutcome {
    let name = backend.name().to_string();
    let result = backend.upload_folder(&cancel, &staged, &label).await;

    match &result {
        Ok(()) => info!(backend = %name, "Successfully uploaded to {}", name),
        Err(e) if e.is_cancelled() => info!(backend = %name, "{} upload cancelled", name),
        Err(e) => warn!(backend = %name, "{} upload failed: {}", name, e),
    }

    BackendOutcome::from_result(&name, result)
}
