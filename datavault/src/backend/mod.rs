//! Remote storage backends.
//!
//! Two layers:
//! - [`RemoteProvider`]: the native primitives of one provider (list a
//!   folder, create a folder, upload a file), keyed by the provider's own
//!   folder ID type.
//! - [`StorageBackend`]: the object-safe contract the dispatcher drives.
//!   [`mirror::RemoteMirror`] implements it once for every provider, so root
//!   container resolution and the recursive tree upload are shared.

pub mod gdrive;
pub mod mirror;
pub mod pcloud;
pub mod registry;

#[cfg(test)]
pub(crate) mod memory;

use crate::utils::Result;
use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub use mirror::RemoteMirror;
pub use registry::{connect_backends, BackendSlot};

/// Name of the single top-level folder every backup run is nested under.
pub const ROOT_CONTAINER_NAME: &str = "DataVault";

/// Upload contract shared by every backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Display name of the provider (e.g. "Google Drive").
    fn name(&self) -> &str;

    /// Create a container named `label` under the root container and mirror
    /// `local_path` beneath it.
    ///
    /// Per-entry failures are logged and skipped. Errors are returned only
    /// when the backend is uninitialized, the run container cannot be
    /// created, the top-level directory cannot be read, or `cancel` fires.
    async fn upload_folder(
        &self,
        cancel: &CancellationToken,
        local_path: &Path,
        label: &str,
    ) -> Result<()>;
}

/// Kind of a remote child entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Folder,
    File,
}

/// A child of a remote folder as reported by the provider
#[derive(Debug, Clone)]
pub struct RemoteEntry<Id> {
    pub id: Id,
    pub name: String,
    pub kind: RemoteKind,
}

/// Native folder/file primitives of one storage provider.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Native folder identifier (string for Drive, numeric for pCloud).
    type Id: Clone + Debug + Display + PartialEq + Send + Sync;

    fn name(&self) -> &str;

    /// ID of the provider's global root folder.
    fn global_root(&self) -> Self::Id;

    /// List the immediate children of `parent`.
    async fn list_children(&self, parent: &Self::Id) -> Result<Vec<RemoteEntry<Self::Id>>>;

    /// Create a folder named `name` under `parent` and return its ID.
    async fn create_folder(&self, parent: &Self::Id, name: &str) -> Result<Self::Id>;

    /// Stream the file at `local_path` into a new remote file under `parent`.
    /// Returns the number of bytes uploaded.
    async fn upload_file(&self, parent: &Self::Id, name: &str, local_path: &Path) -> Result<u64>;
}
