//! Fixed-interval scheduler driving the orchestrator until shutdown.

use crate::orchestrator::BackupOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct BackupScheduler {
    orchestrator: Arc<BackupOrchestrator>,
    interval: Duration,
}

impl BackupScheduler {
    pub fn new(orchestrator: Arc<BackupOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a cycle now and then once per interval until `cancel` fires.
    ///
    /// Returns the number of cycles that actually ran.
    pub async fn run(&self, cancel: &CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        info!("Scheduler started, backing up every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.tick(cancel).await {
                cycles += 1;
            }
        }

        info!(cycles, "Scheduler stopped");
        cycles
    }

    async fn tick(&self, cancel: &CancellationToken) -> bool {
        let Some(result) = self.orchestrator.try_run_cycle(cancel).await else {
            warn!("Skipping scheduled run: backup already running");
            return false;
        };

        match result.and_then(|report| report.ensure_success().map(|()| report)) {
            Ok(report) => {
                if report.dry_run {
                    info!(label = %report.label, "Dry run completed");
                }
            }
            Err(e) if e.is_cancelled() => info!("Backup cycle cancelled"),
            Err(e) if cancel.is_cancelled() => info!("Backup cycle interrupted by shutdown: {}", e),
            Err(e) => error!(error = %e, "Scheduled backup failed"),
        }
        true
    }
}
