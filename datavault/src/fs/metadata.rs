//! Permission metadata carried from the source tree into staging.

use std::fs;
use std::path::Path;

/// Metadata captured for a staged entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Unix mode bits, when the platform has them
    pub mode: Option<u32>,

    /// Read-only flag for platforms without mode bits
    pub readonly: bool,

    /// Is this a directory?
    pub is_dir: bool,
}

impl EntryMetadata {
    /// Extract metadata from a path, following symlinks
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&fs::metadata(path)?))
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let mode = None;

        Self {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mode,
            readonly: metadata.permissions().readonly(),
            is_dir: metadata.is_dir(),
        }
    }

    /// Re-apply the captured permission bits to `path`
    #[cfg(unix)]
    pub fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(self.readonly);
        fs::set_permissions(path, perms)
    }
}
