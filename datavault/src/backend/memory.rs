//! In-memory provider used as a test double for the upload pipeline.

use super::{RemoteEntry, RemoteKind, RemoteProvider};
use crate::utils::{DataVaultError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MemoryNode {
    pub name: String,
    pub parent: u64,
    pub kind: RemoteKind,
    pub content: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    nodes: BTreeMap<u64, MemoryNode>,
    calls: usize,
    fail_names: HashSet<String>,
    fail_listing: bool,
}

impl MemoryState {
    fn insert(&mut self, parent: u64, name: &str, kind: RemoteKind, content: Vec<u8>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.nodes.insert(
            id,
            MemoryNode {
                name: name.to_string(),
                parent,
                kind,
                content,
            },
        );
        id
    }
}

/// Provider keeping its folder tree in memory. Folder 0 is the global root.
/// Clones share state, so a test can keep a handle after moving one into a
/// backend.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    name: String,
    state: Arc<Mutex<MemoryState>>,
    upload_delay: Option<Duration>,
}

impl MemoryProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MemoryState::default())),
            upload_delay: None,
        }
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Make folder creation or file upload of any entry named `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.state().fail_names.insert(name.to_string());
    }

    pub fn fail_listing(&self) {
        self.state().fail_listing = true;
    }

    /// Number of provider primitives invoked so far
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    pub fn insert_folder(&self, parent: u64, name: &str) -> u64 {
        self.state().insert(parent, name, RemoteKind::Folder, Vec::new())
    }

    pub fn insert_file(&self, parent: u64, name: &str, content: &[u8]) -> u64 {
        self.state().insert(parent, name, RemoteKind::File, content.to_vec())
    }

    pub fn folders_named(&self, name: &str) -> usize {
        self.state()
            .nodes
            .values()
            .filter(|n| n.kind == RemoteKind::Folder && n.name == name)
            .count()
    }

    pub fn file_count(&self) -> usize {
        self.state()
            .nodes
            .values()
            .filter(|n| n.kind == RemoteKind::File)
            .count()
    }

    pub fn child_named(&self, parent: u64, name: &str) -> Option<u64> {
        self.state()
            .nodes
            .iter()
            .find(|(_, n)| n.parent == parent && n.name == name)
            .map(|(id, _)| *id)
    }

    /// Everything below `folder`, keyed by `/`-joined relative path.
    /// Folders map to `None`, files to their content.
    pub fn tree(&self, folder: u64) -> BTreeMap<String, Option<Vec<u8>>> {
        let state = self.state();
        let mut out = BTreeMap::new();
        let mut pending = vec![(folder, String::new())];

        while let Some((parent, prefix)) = pending.pop() {
            for (id, node) in state.nodes.iter().filter(|(_, n)| n.parent == parent) {
                let path = if prefix.is_empty() {
                    node.name.clone()
                } else {
                    format!("{}/{}", prefix, node.name)
                };
                match node.kind {
                    RemoteKind::Folder => {
                        out.insert(path.clone(), None);
                        pending.push((*id, path));
                    }
                    RemoteKind::File => {
                        out.insert(path, Some(node.content.clone()));
                    }
                }
            }
        }
        out
    }

    fn begin_call(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.calls += 1;
        if state.fail_names.contains(name) {
            return Err(DataVaultError::Api {
                provider: "memory",
                code: 500,
                message: format!("injected failure for {}", name),
            });
        }
        Ok(())
    }
}

/// Snapshot of a local directory in the same shape as [`MemoryProvider::tree`].
pub fn local_tree(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    let mut out = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            out.insert(rel, None);
        } else {
            out.insert(rel, Some(std::fs::read(entry.path()).unwrap()));
        }
    }
    out
}

#[async_trait]
impl RemoteProvider for MemoryProvider {
    type Id = u64;

    fn name(&self) -> &str {
        &self.name
    }

    fn global_root(&self) -> u64 {
        0
    }

    async fn list_children(&self, parent: &u64) -> Result<Vec<RemoteEntry<u64>>> {
        let mut state = self.state();
        state.calls += 1;
        if state.fail_listing {
            return Err(DataVaultError::Authentication("listing refused".into()));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == *parent)
            .map(|(id, n)| RemoteEntry {
                id: *id,
                name: n.name.clone(),
                kind: n.kind,
            })
            .collect())
    }

    async fn create_folder(&self, parent: &u64, name: &str) -> Result<u64> {
        self.begin_call(name)?;
        Ok(self.state().insert(*parent, name, RemoteKind::Folder, Vec::new()))
    }

    async fn upload_file(&self, parent: &u64, name: &str, local_path: &Path) -> Result<u64> {
        self.begin_call(name)?;
        let content = tokio::fs::read(local_path).await?;
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        let len = content.len() as u64;
        self.state().insert(*parent, name, RemoteKind::File, content);
        Ok(len)
    }
}
