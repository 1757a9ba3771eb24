//! Provider-independent upload algorithm.
//!
//! [`RemoteMirror`] wraps a [`RemoteProvider`], resolves its root container
//! once at startup, and mirrors staged directory trees beneath it.
//!
//! Known limitation: root resolution is list-then-create. Two processes
//! resolving against the same account at the same moment can both miss the
//! folder and each create one; nothing here coordinates across processes.

use super::{RemoteKind, RemoteProvider, StorageBackend, ROOT_CONTAINER_NAME};
use crate::utils::{DataVaultError, Result};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one mirrored tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub folders: usize,
    pub files: usize,
    pub bytes: u64,
    /// Entries that failed and were skipped
    pub failures: usize,
}

impl AddAssign for MirrorStats {
    fn add_assign(&mut self, other: Self) {
        self.folders += other.folders;
        self.files += other.files;
        self.bytes += other.bytes;
        self.failures += other.failures;
    }
}

/// Backend adapter driving one provider through the shared upload algorithm.
pub struct RemoteMirror<P: RemoteProvider> {
    provider: P,
    root: Option<P::Id>,
}

impl<P: RemoteProvider> RemoteMirror<P> {
    /// Create an uninitialized adapter. Uploads fail until
    /// [`initialize`](Self::initialize) succeeds.
    pub fn new(provider: P) -> Self {
        Self { provider, root: None }
    }

    /// Resolved root container, if initialization succeeded
    pub fn root(&self) -> Option<&P::Id> {
        self.root.as_ref()
    }

    /// Resolve the root container and make the adapter usable.
    pub async fn initialize(&mut self) -> Result<()> {
        let root = self.ensure_root_container().await?;
        self.root = Some(root);
        Ok(())
    }

    /// Find the well-known root folder under the provider's global root, or
    /// create it if no folder with that name exists.
    pub async fn ensure_root_container(&self) -> Result<P::Id> {
        let global = self.provider.global_root();
        let children = self.provider.list_children(&global).await?;

        if let Some(existing) = children
            .into_iter()
            .find(|c| c.kind == RemoteKind::Folder && c.name == ROOT_CONTAINER_NAME)
        {
            info!(
                backend = %self.provider.name(),
                "Found existing {} folder: {}",
                ROOT_CONTAINER_NAME,
                existing.id
            );
            return Ok(existing.id);
        }

        let id = self.provider.create_folder(&global, ROOT_CONTAINER_NAME).await?;
        info!(backend = %self.provider.name(), "Created {} folder: {}", ROOT_CONTAINER_NAME, id);
        Ok(id)
    }

    /// Mirror the contents of `local_dir` into the remote folder `target`.
    pub async fn mirror_tree(
        &self,
        cancel: &CancellationToken,
        local_dir: &Path,
        target: P::Id,
    ) -> Result<MirrorStats> {
        self.mirror_dir(cancel, local_dir.to_path_buf(), target, PathBuf::new())
            .await
    }

    fn mirror_dir<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        local_dir: PathBuf,
        target: P::Id,
        relative: PathBuf,
    ) -> BoxFuture<'a, Result<MirrorStats>> {
        async move {
            let backend = self.provider.name();
            let mut stats = MirrorStats::default();
            let mut entries = tokio::fs::read_dir(&local_dir).await?;

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(
                            backend = %backend,
                            "Stopped reading {}: {}",
                            local_dir.display(),
                            e
                        );
                        stats.failures += 1;
                        break;
                    }
                };

                if cancel.is_cancelled() {
                    return Err(DataVaultError::Cancelled);
                }

                let name = entry.file_name().to_string_lossy().into_owned();
                let path = entry.path();
                let entry_rel = relative.join(&name);

                let is_dir = match tokio::fs::metadata(&path).await {
                    Ok(metadata) => metadata.is_dir(),
                    Err(e) => {
                        warn!(backend = %backend, "Failed to stat {}: {}", entry_rel.display(), e);
                        stats.failures += 1;
                        continue;
                    }
                };

                if is_dir {
                    let created =
                        with_cancel(cancel, self.provider.create_folder(&target, &name)).await;
                    let folder = match created {
                        Ok(id) => id,
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            warn!(
                                backend = %backend,
                                "Failed to create folder {}: {}",
                                entry_rel.display(),
                                e
                            );
                            stats.failures += 1;
                            continue;
                        }
                    };
                    stats.folders += 1;

                    match self.mirror_dir(cancel, path, folder, entry_rel.clone()).await {
                        Ok(sub) => stats += sub,
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            warn!(
                                backend = %backend,
                                "Failed to upload subdirectory {}: {}",
                                entry_rel.display(),
                                e
                            );
                            stats.failures += 1;
                        }
                    }
                } else {
                    let uploaded =
                        with_cancel(cancel, self.provider.upload_file(&target, &name, &path)).await;
                    match uploaded {
                        Ok(bytes) => {
                            debug!(
                                backend = %backend,
                                "Uploaded file: {} ({} bytes)",
                                entry_rel.display(),
                                bytes
                            );
                            stats.files += 1;
                            stats.bytes += bytes;
                        }
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => {
                            warn!(
                                backend = %backend,
                                "Failed to upload file {}: {}",
                                entry_rel.display(),
                                e
                            );
                            stats.failures += 1;
                        }
                    }
                }
            }

            Ok(stats)
        }
        .boxed()
    }
}

/// Race a provider call against cancellation.
async fn with_cancel<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DataVaultError::Cancelled),
        result = call => result,
    }
}

#[async_trait]
impl<P> StorageBackend for RemoteMirror<P>
where
    P: RemoteProvider + 'static,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn upload_folder(
        &self,
        cancel: &CancellationToken,
        local_path: &Path,
        label: &str,
    ) -> Result<()> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| DataVaultError::Uninitialized(self.name().to_string()))?;

        if cancel.is_cancelled() {
            return Err(DataVaultError::Cancelled);
        }

        info!(backend = %self.name(), "Uploading {} as {}", local_path.display(), label);

        let run_folder = with_cancel(cancel, self.provider.create_folder(&root, label)).await?;
        info!(backend = %self.name(), "Created backup folder: {}", run_folder);

        let stats = self.mirror_tree(cancel, local_path, run_folder).await?;
        info!(
            backend = %self.name(),
            "Upload finished: {} folders, {} files, {} bytes, {} skipped after errors",
            stats.folders, stats.files, stats.bytes, stats.failures
        );

        Ok(())
    }
}
