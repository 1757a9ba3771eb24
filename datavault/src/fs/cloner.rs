//! Directory cloner: copies the source tree into a run's staging directory.
//!
//! Staging is all-or-nothing. The first entry that cannot be copied aborts
//! the clone, and the caller is expected to remove the partial output.

use crate::fs::metadata::EntryMetadata;
use crate::fs::walker::{walk_tree, WalkOptions};
use crate::utils::{DataVaultError, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Totals for one clone operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Copies a directory tree, preserving relative paths and permission bits.
#[derive(Debug, Clone, Default)]
pub struct DirectoryCloner {
    options: WalkOptions,
}

impl DirectoryCloner {
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    /// Clone `src` into `dst`, creating `dst` if it does not exist.
    ///
    /// Directory permissions are applied after their contents are copied so
    /// read-only source directories can still be staged.
    pub fn clone_tree(&self, src: &Path, dst: &Path) -> Result<CloneStats> {
        let root_meta =
            EntryMetadata::from_path(src).map_err(|e| DataVaultError::staging(src, e))?;
        if !root_meta.is_dir {
            return Err(DataVaultError::staging(
                src,
                io::Error::new(io::ErrorKind::InvalidInput, "source is not a directory"),
            ));
        }

        fs::create_dir_all(dst).map_err(|e| DataVaultError::staging(dst, e))?;

        let entries = walk_tree(src, &self.options).map_err(|e| DataVaultError::staging(src, e))?;

        let mut stats = CloneStats::default();
        let mut directories = vec![(dst.to_path_buf(), root_meta)];

        for entry in entries {
            let target = dst.join(&entry.relative_path);

            if entry.is_dir() {
                fs::create_dir_all(&target).map_err(|e| DataVaultError::staging(&target, e))?;
                stats.directories += 1;
                directories.push((target, entry.metadata));
            } else {
                let copied = copy_file(&entry.path, &target, &entry.metadata)
                    .map_err(|e| DataVaultError::staging(&entry.path, e))?;
                debug!("Staged {} ({} bytes)", entry.relative_path.display(), copied);
                stats.files += 1;
                stats.bytes += copied;
            }
        }

        // Deepest first, so a read-only parent never blocks its children.
        for (path, metadata) in directories.iter().rev() {
            metadata
                .apply_permissions(path)
                .map_err(|e| DataVaultError::staging(path, e))?;
        }

        Ok(stats)
    }
}

/// Copy file contents byte-for-byte, then re-apply the source permission bits.
fn copy_file(src: &Path, dst: &Path, metadata: &EntryMetadata) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dst)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    drop(writer);

    metadata.apply_permissions(dst)?;
    Ok(copied)
}

/// Remove a staging directory, making read-only directories writable first
/// if a plain removal is refused.
pub fn remove_staging(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!("Retrying removal of {} after restoring write access", path.display());
            make_writable(path)?;
            fs::remove_dir_all(path)
        }
        Err(e) => Err(e),
    }
}

fn make_writable(path: &Path) -> io::Result<()> {
    for entry in walkdir::WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            let mut perms = entry.metadata()?.permissions();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                perms.set_mode(perms.mode() | 0o700);
            }
            #[cfg(not(unix))]
            perms.set_readonly(false);
            fs::set_permissions(entry.path(), perms)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree() -> std::io::Result<TempDir> {
        let src = TempDir::new()?;
        fs::write(src.path().join("a.txt"), b"abc")?;
        fs::create_dir(src.path().join("sub"))?;
        fs::write(src.path().join("sub/b.txt"), b"")?;
        Ok(src)
    }

    #[test]
    fn test_clone_preserves_layout_and_content() -> Result<()> {
        let src = sample_tree()?;
        let staging = TempDir::new()?;
        let dst = staging.path().join("copy");

        let stats = DirectoryCloner::default().clone_tree(src.path(), &dst)?;

        assert_eq!(stats, CloneStats { files: 2, directories: 1, bytes: 3 });
        assert_eq!(fs::read(dst.join("a.txt"))?, b"abc");
        assert_eq!(fs::read(dst.join("sub/b.txt"))?, b"");
        assert!(dst.join("sub").is_dir());
        Ok(())
    }

    #[test]
    fn test_clone_applies_excludes() -> Result<()> {
        let src = sample_tree()?;
        fs::write(src.path().join("noise.log"), b"log")?;
        let staging = TempDir::new()?;
        let dst = staging.path().join("copy");

        let cloner = DirectoryCloner::new(WalkOptions::with_excludes(vec!["*.log".into()]));
        let stats = cloner.clone_tree(src.path(), &dst)?;

        assert_eq!(stats.files, 2);
        assert!(!dst.join("noise.log").exists());
        Ok(())
    }

    #[test]
    fn test_missing_source_fails() {
        let staging = TempDir::new().unwrap();
        let err = DirectoryCloner::default()
            .clone_tree(Path::new("/nonexistent/datavault/source"), &staging.path().join("x"))
            .unwrap_err();
        assert!(matches!(err, DataVaultError::Staging { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_permission_bits_are_reapplied() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let src = sample_tree()?;
        fs::set_permissions(src.path().join("a.txt"), fs::Permissions::from_mode(0o751))?;
        fs::set_permissions(src.path().join("sub"), fs::Permissions::from_mode(0o555))?;
        let staging = TempDir::new()?;
        let dst = staging.path().join("copy");

        DirectoryCloner::default().clone_tree(src.path(), &dst)?;

        let file_mode = fs::metadata(dst.join("a.txt"))?.permissions().mode() & 0o777;
        let dir_mode = fs::metadata(dst.join("sub"))?.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o751);
        assert_eq!(dir_mode, 0o555);

        remove_staging(&dst)?;
        assert!(!dst.exists());

        fs::set_permissions(src.path().join("sub"), fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_file_fails_whole_clone() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        // Root ignores permission bits.
        if running_as_root() {
            return Ok(());
        }

        let src = sample_tree()?;
        let secret = src.path().join("secret.txt");
        fs::write(&secret, b"x")?;
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000))?;
        let staging = TempDir::new()?;

        let result =
            DirectoryCloner::default().clone_tree(src.path(), &staging.path().join("copy"));
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644))?;

        assert!(matches!(result, Err(DataVaultError::Staging { .. })));
        Ok(())
    }

    #[cfg(unix)]
    fn running_as_root() -> bool {
        use std::os::unix::fs::MetadataExt;
        fs::metadata("/proc/self").map(|m| m.uid() == 0).unwrap_or(false)
    }

    #[test]
    fn test_remove_missing_staging_is_ok() {
        assert!(remove_staging(Path::new("/nonexistent/datavault/staging")).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_fifo_in_source_does_not_block_staging() -> Result<()> {
        let src = sample_tree()?;
        let status = std::process::Command::new("mkfifo")
            .arg(src.path().join("pipe"))
            .status()?;
        assert!(status.success());
        let staging = TempDir::new()?;
        let dst = staging.path().join("copy");

        let (tx, rx) = std::sync::mpsc::channel();
        let (from, to) = (src.path().to_path_buf(), dst.clone());
        std::thread::spawn(move || {
            let _ = tx.send(DirectoryCloner::default().clone_tree(&from, &to));
        });
        let stats = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("clone_tree must not block on a FIFO")?;

        assert_eq!(stats.files, 2);
        assert!(!dst.join("pipe").exists());
        assert_eq!(fs::read(dst.join("a.txt"))?, b"abc");
        Ok(())
    }
}

