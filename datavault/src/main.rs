//! DataVault - Main entry point
//!
//! Backs up a directory to Google Drive and pCloud on a fixed interval.

use anyhow::Result;
use clap::Parser;
use datavault::backend::connect_backends;
use datavault::config::{
    CliOverrides, Config, ConfigFile, EnvOverrides, Loaded, DEFAULT_CONFIG_FILE,
};
use datavault::daemon::shutdown::ShutdownCoordinator;
use datavault::orchestrator::OrchestratorOptions;
use datavault::{utils, BackupOrchestrator, BackupScheduler, UploadDispatcher};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder to back up (overrides config and DATAVAULT_SOURCE)
    #[arg(long, value_name = "DIR")]
    source: Option<String>,

    /// Backup interval such as 30m, 1h or 2h30m
    #[arg(long)]
    interval: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Google Drive credentials JSON file
    #[arg(long, value_name = "FILE")]
    gdrive_auth: Option<String>,

    /// pCloud access token
    #[arg(long, value_name = "TOKEN")]
    pcloud_auth: Option<String>,

    /// Stage the source but skip uploads
    #[arg(long)]
    dry_run: bool,

    /// Debug logging with per-backend results
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single backup cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration, creating a default file on first start
    let (file, created) = match ConfigFile::load_or_create(&args.config) {
        Ok(Loaded::Existing(file)) => (file, false),
        Ok(Loaded::Created(file)) => (file, true),
        Err(e) => {
            eprintln!("Failed to load config {}: {}, using defaults", args.config.display(), e);
            (ConfigFile::default(), false)
        }
    };
    let max_backups = file.max_backups;

    let cli = CliOverrides {
        source: args.source,
        interval: args.interval,
        gdrive_auth: args.gdrive_auth,
        pcloud_auth: args.pcloud_auth,
        dry_run: args.dry_run,
        verbose: args.verbose,
        log_level: args.log_level,
    };
    let config = Config::resolve(file, EnvOverrides::from_env(), cli)?;

    // Initialize logging
    utils::logger::init(&config.log_level, config.verbose)?;

    tracing::info!("Starting DataVault v{}", env!("CARGO_PKG_VERSION"));
    if created {
        tracing::info!("Created default configuration at {}", args.config.display());
    }
    if max_backups.is_some() {
        tracing::warn!("max_backups is set but old backups are never pruned");
    }
    tracing::info!("Source folder: {}", config.source.display());
    tracing::info!("Backup interval: {:?}", config.interval);
    tracing::info!("Staging directory: {}", config.staging_root.display());
    if config.dry_run {
        tracing::info!("Dry run: uploads are skipped");
    }

    // Create shutdown coordinator
    let shutdown_coordinator = ShutdownCoordinator::new();
    let cancel = shutdown_coordinator.token();
    let signal_handle = tokio::spawn(async move {
        shutdown_coordinator.wait_for_signal().await;
    });

    let slots = connect_backends(&config).await;
    let dispatcher = UploadDispatcher::new(slots)?;
    tracing::info!(
        "{} of {} backends ready",
        dispatcher.configured_count(),
        dispatcher.slots().len()
    );

    let orchestrator = Arc::new(BackupOrchestrator::new(
        OrchestratorOptions::from_config(&config),
        dispatcher,
    ));

    if args.once {
        let result = orchestrator
            .run_cycle(&cancel)
            .await
            .and_then(|report| report.ensure_success());
        cancel.cancel();
        let _ = signal_handle.await;
        result?;
    } else {
        BackupScheduler::new(orchestrator, config.interval)
            .run(&cancel)
            .await;
        let _ = signal_handle.await;
    }

    tracing::info!("DataVault shutdown complete");
    Ok(())
}
