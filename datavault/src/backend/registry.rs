//! Startup construction of every known backend.
//!
//! Each provider gets exactly one slot. A slot is configured only when its
//! credentials were supplied and root container resolution succeeded;
//! otherwise it stays `NotConfigured` for the lifetime of the process.

use super::gdrive::GoogleDriveClient;
use super::mirror::RemoteMirror;
use super::pcloud::PCloudClient;
use super::{RemoteProvider, StorageBackend};
use crate::config::Config;
use crate::utils::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub const GOOGLE_DRIVE: &str = "Google Drive";
pub const PCLOUD: &str = "pCloud";

/// One backend as seen by the dispatcher
#[derive(Clone)]
pub enum BackendSlot {
    Configured(Arc<dyn StorageBackend>),
    NotConfigured { name: String, reason: String },
}

impl BackendSlot {
    pub fn not_configured(name: &str, reason: impl Into<String>) -> Self {
        BackendSlot::NotConfigured {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BackendSlot::Configured(backend) => backend.name(),
            BackendSlot::NotConfigured { name, .. } => name,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, BackendSlot::Configured(_))
    }
}

impl std::fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSlot::Configured(backend) => {
                f.debug_tuple("Configured").field(&backend.name()).finish()
            }
            BackendSlot::NotConfigured { name, reason } => f
                .debug_struct("NotConfigured")
                .field("name", name)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Initialize a provider's root container, degrading to `NotConfigured`
/// when that fails.
pub async fn connect<P>(name: &str, provider: Result<P>) -> BackendSlot
where
    P: RemoteProvider + 'static,
{
    let provider = match provider {
        Ok(p) => p,
        Err(e) => {
            warn!(backend = %name, "Failed to initialize {} client: {}", name, e);
            return BackendSlot::not_configured(name, e.to_string());
        }
    };

    let mut mirror = RemoteMirror::new(provider);
    match mirror.initialize().await {
        Ok(()) => {
            info!(backend = %name, "{} ready", name);
            BackendSlot::Configured(Arc::new(mirror))
        }
        Err(e) => {
            warn!(backend = %name, "Failed to set up {} root folder: {}", name, e);
            BackendSlot::not_configured(name, format!("failed to setup root folder: {}", e))
        }
    }
}

/// Build one slot per supported provider from the resolved configuration.
pub async fn connect_backends(config: &Config) -> Vec<BackendSlot> {
    let gdrive = match &config.google_drive {
        Some(settings) => {
            let client = GoogleDriveClient::from_files(
                &settings.credentials_file,
                &settings.token_file,
                &settings.api_url,
            );
            connect(GOOGLE_DRIVE, client).await
        }
        None => BackendSlot::not_configured(GOOGLE_DRIVE, "no credentials supplied"),
    };

    let pcloud = match &config.pcloud {
        Some(settings) => {
            let client = PCloudClient::new(&settings.access_token, &settings.api_url);
            connect(PCLOUD, client).await
        }
        None => BackendSlot::not_configured(PCLOUD, "no credentials supplied"),
    };

    vec![gdrive, pcloud]
}
