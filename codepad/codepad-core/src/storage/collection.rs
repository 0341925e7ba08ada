//! Persistence for node records.
//!
//! A collection stores whole records keyed by id. Multi-record consistency
//! is handled by [`NodeStore`](super::NodeStore), not here.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use super::node::{FileNode, NodeId};
use crate::error::Result;

pub trait NodeCollection: Send + Sync {
    /// Read every persisted record.
    fn load_all(&self) -> Result<Vec<FileNode>>;
    /// Insert or replace a record.
    fn put(&self, node: &FileNode) -> Result<()>;
    /// Remove a record. Removing a missing record is not an error.
    fn remove(&self, id: NodeId) -> Result<()>;
}

/// One JSON file per node inside a directory.
pub struct DiskCollection {
    dir: PathBuf,
}

impl DiskCollection {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, id: NodeId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl NodeCollection for DiskCollection {
    fn load_all(&self) -> Result<Vec<FileNode>> {
        let mut nodes = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file()
                || path.extension().and_then(|s| s.to_str()) != Some("json")
            {
                continue;
            }
            let data = std::fs::read(&path)?;
            match serde_json::from_slice::<FileNode>(&data) {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable node record");
                }
            }
        }
        Ok(nodes)
    }

    fn put(&self, node: &FileNode) -> Result<()> {
        let data = serde_json::to_vec(node)?;
        // records are replaced by rename, never rewritten in place
        let tmp = self.dir.join(format!("{}.json.tmp", node.id));
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, self.path(node.id))?;
        Ok(())
    }

    fn remove(&self, id: NodeId) -> Result<()> {
        match std::fs::remove_file(self.path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile collection used by tests and throwaway servers.
#[derive(Default)]
pub struct MemoryCollection {
    records: Mutex<HashMap<NodeId, FileNode>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl NodeCollection for MemoryCollection {
    fn load_all(&self) -> Result<Vec<FileNode>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn put(&self, node: &FileNode) -> Result<()> {
        self.records.lock().insert(node.id, node.clone());
        Ok(())
    }

    fn remove(&self, id: NodeId) -> Result<()> {
        self.records.lock().remove(&id);
        Ok(())
    }
}
