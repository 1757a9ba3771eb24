//! Directory traversal for staging.
//!
//! Yields every directory and file below a root (the root itself excluded),
//! parents before children, with excluded names pruned together with their
//! subtrees.

use crate::fs::metadata::EntryMetadata;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Exclude patterns matched against file names.
    ///
    /// `*.ext` matches a suffix, `prefix*` a prefix, anything else must
    /// match the whole name.
    pub exclude_patterns: Vec<String>,
}

impl WalkOptions {
    pub fn with_excludes(exclude_patterns: Vec<String>) -> Self {
        Self { exclude_patterns }
    }
}

/// An entry discovered during walking
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// Metadata of the entry (symlinks resolved)
    pub metadata: EntryMetadata,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir
    }

    /// Create a TreeEntry from a DirEntry.
    ///
    /// Symlinks resolve to their target. Returns None for anything that is
    /// not a regular file or directory (FIFOs, sockets, devices), for
    /// symlinks to directories and for broken symlinks.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => {
                    tracing::warn!("Skipping symlink to directory: {}", path.display());
                    return Ok(None);
                }
                Ok(resolved) if !resolved.is_file() => {
                    tracing::warn!("Skipping symlink to special file: {}", path.display());
                    return Ok(None);
                }
                Ok(resolved) => resolved,
                Err(_) => {
                    tracing::warn!("Skipping broken symlink: {}", path.display());
                    return Ok(None);
                }
            }
        } else {
            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                tracing::warn!("Skipping special file: {}", path.display());
                return Ok(None);
            }
            entry.metadata()?
        };

        Ok(Some(Self {
            path,
            relative_path,
            metadata: EntryMetadata::from_metadata(&metadata),
        }))
    }
}

/// Walk a directory tree and collect all directories and files
///
/// # Example
/// ```no_run
/// use datavault::fs::walker::{walk_tree, WalkOptions};
/// use std::path::Path;
///
/// let entries = walk_tree(Path::new("/data"), &WalkOptions::default()).unwrap();
/// println!("Found {} entries", entries.len());
/// ```
pub fn walk_tree(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_excluded(e, &options.exclude_patterns));

    for entry in walker {
        let entry = entry?;
        if let Some(tree_entry) = TreeEntry::from_entry(&entry, root)? {
            entries.push(tree_entry);
        }
    }

    Ok(entries)
}

fn is_excluded(entry: &DirEntry, patterns: &[String]) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|p| matches_pattern(&file_name, p))
}

/// Match a file name against a single exclude pattern
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else {
        name == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let entries = walk_tree(temp_dir.path(), &WalkOptions::default())?;
        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_lists_directories_before_children() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let entries = walk_tree(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(entries.len(), 3);

        let dir_pos = entries
            .iter()
            .position(|e| e.relative_path == Path::new("subdir"))
            .unwrap();
        let child_pos = entries
            .iter()
            .position(|e| e.relative_path == Path::new("subdir/file2.txt"))
            .unwrap();
        assert!(entries[dir_pos].is_dir());
        assert!(dir_pos < child_pos);

        Ok(())
    }

    #[test]
    fn test_exclude_patterns_prune_subtrees() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join(".git"))?;
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref")?;
        fs::write(temp_dir.path().join("keep.txt"), b"keep")?;
        fs::write(temp_dir.path().join("scratch.tmp"), b"drop")?;

        let options = WalkOptions::with_excludes(vec![".git".into(), "*.tmp".into()]);
        let entries = walk_tree(temp_dir.path(), &options)?;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, Path::new("keep.txt"));

        Ok(())
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("debug.log", "*.log"));
        assert!(!matches_pattern("log.txt", "*.log"));
        assert!(matches_pattern("Thumbs.db", "Thumbs.db"));
        assert!(!matches_pattern("MyThumbs.db", "Thumbs.db"));
        assert!(matches_pattern("~lockfile", "~*"));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_to_directory_is_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let target = TempDir::new()?;

        fs::write(temp_dir.path().join("real.txt"), b"x")?;
        std::os::unix::fs::symlink(target.path(), temp_dir.path().join("linked"))?;

        let entries = walk_tree(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, Path::new("real.txt"));

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_fifo_is_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"abc")?;
        let status = std::process::Command::new("mkfifo")
            .arg(temp_dir.path().join("pipe"))
            .status()?;
        assert!(status.success());

        let entries = walk_tree(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, Path::new("a.txt"));

        Ok(())
    }
}
