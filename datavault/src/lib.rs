//! DataVault Library
//!
//! Periodic directory backup to multiple cloud storage backends.

pub mod backend;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod fs;
pub mod orchestrator;
pub mod scheduler;
pub mod utils;

// Re-export commonly used types
pub use backend::{BackendSlot, StorageBackend};
pub use config::Config;
pub use dispatch::{BackendOutcome, OutcomeStatus, UploadDispatcher};
pub use orchestrator::{BackupOrchestrator, CycleReport};
pub use scheduler::BackupScheduler;
pub use utils::errors::DataVaultError;
pub type Result<T> = std::result::Result<T, DataVaultError>;
