//! Hierarchical path store over a flat collection of node records.
//!
//! Ancestry is always computed from `parent_id` links held in an adjacency
//! index; the materialized `path` is derived from those links and only used
//! for lookups and display, never for descendant queries.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blob::{content_key, BlobStorage, MemoryBlobStorage};
use super::collection::{DiskCollection, MemoryCollection, NodeCollection};
use super::node::{FileNode, NewNode, NodeChange, NodeId, NodeType, ProjectId, TreeNode};
use super::validation::{
    check_path_len, display_path, join_path, normalize_path, rebase_path, validate_name,
};
use crate::error::{Result, StoreError};
use crate::events::{Event, EventBus};
use crate::search::SearchQuery;

pub const DEFAULT_MAX_CONTENT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub max_content_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }
}

type ParentKey = (ProjectId, Option<NodeId>);

pub struct NodeStore {
    nodes: HashMap<NodeId, FileNode>,
    paths: HashMap<(ProjectId, String), NodeId>,
    children: HashMap<ParentKey, HashSet<NodeId>>,
    collection: Arc<dyn NodeCollection>,
    blobs: Arc<dyn BlobStorage>,
    events: EventBus,
    config: StoreConfig,
}

impl NodeStore {
    /// Load every record from `collection` and rebuild the indexes.
    ///
    /// Paths that disagree with their parent chain are rewritten and
    /// persisted; unreachable records are kept but reported by
    /// [`orphan_ids`](Self::orphan_ids).
    pub fn open(
        collection: Arc<dyn NodeCollection>,
        blobs: Arc<dyn BlobStorage>,
        events: EventBus,
        config: StoreConfig,
    ) -> Result<Self> {
        let mut store = Self {
            nodes: HashMap::new(),
            paths: HashMap::new(),
            children: HashMap::new(),
            collection,
            blobs,
            events,
            config,
        };
        for node in store.collection.load_all()? {
            store
                .children
                .entry((node.project_id, node.parent_id))
                .or_default()
                .insert(node.id);
            store.nodes.insert(node.id, node);
        }
        store.repair_paths()?;
        for node in store.nodes.values() {
            let key = (node.project_id, node.path.clone());
            if let Some(existing) = store.paths.get(&key) {
                warn!(path = %node.path, first = %existing, second = %node.id, "duplicate path on load");
                continue;
            }
            store.paths.insert(key, node.id);
        }
        info!(nodes = store.nodes.len(), "node store opened");
        Ok(store)
    }

    /// Store persisted as one JSON file per node under `dir`.
    pub fn open_dir(
        dir: impl Into<PathBuf>,
        blobs: Arc<dyn BlobStorage>,
        events: EventBus,
        config: StoreConfig,
    ) -> Result<Self> {
        let collection = Arc::new(DiskCollection::new(dir)?);
        Self::open(collection, blobs, events, config)
    }

    /// Volatile store with in-memory records and blobs.
    pub fn in_memory() -> Self {
        Self {
            nodes: HashMap::new(),
            paths: HashMap::new(),
            children: HashMap::new(),
            collection: Arc::new(MemoryCollection::new()),
            blobs: Arc::new(MemoryBlobStorage::new()),
            events: EventBus::new(),
            config: StoreConfig::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(&id)
    }

    /// Look up a node by path. Accepts paths with or without a leading `/`.
    pub fn find_by_path(&self, project_id: ProjectId, path: &str) -> Option<&FileNode> {
        let path = normalize_path(path).ok()?;
        self.paths
            .get(&(project_id, path))
            .and_then(|id| self.nodes.get(id))
    }

    /// Every node of a project, ordered by path.
    pub fn list_project(&self, project_id: ProjectId) -> Vec<&FileNode> {
        let mut nodes: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.project_id == project_id)
            .collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// Direct children of `parent_id` (or of the root), folders first.
    pub fn list_children(
        &self,
        project_id: ProjectId,
        parent_id: Option<NodeId>,
    ) -> Result<Vec<&FileNode>> {
        self.resolve_parent(project_id, parent_id)?;
        let mut nodes: Vec<_> = self
            .child_ids(project_id, parent_id)
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .collect();
        nodes.sort_by(|a, b| a.listing_key().cmp(&b.listing_key()));
        Ok(nodes)
    }

    /// Build the ordered nested tree of a project.
    ///
    /// Only nodes reachable from the root through `parent_id` links appear.
    pub fn build_tree(&self, project_id: ProjectId) -> Vec<TreeNode> {
        // pre-order walk; every node lands after its parent
        let mut order = Vec::new();
        let mut stack = self.child_ids(project_id, None);
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.child_ids(project_id, Some(id)));
        }

        let mut built: HashMap<Option<NodeId>, Vec<TreeNode>> = HashMap::new();
        for id in order.into_iter().rev() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let mut tree = TreeNode::leaf(node);
            if let Some(mut children) = built.remove(&Some(id)) {
                children.sort_by(|a, b| a.listing_key().cmp(&b.listing_key()));
                tree.children = children;
            }
            built.entry(node.parent_id).or_default().push(tree);
        }
        let mut roots = built.remove(&None).unwrap_or_default();
        roots.sort_by(|a, b| a.listing_key().cmp(&b.listing_key()));
        roots
    }

    pub fn search(&self, project_id: ProjectId, query: &SearchQuery) -> Result<Vec<&FileNode>> {
        let matcher = query.matcher()?;
        let mut hits: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.project_id == project_id)
            .filter(|n| query.node_type.map_or(true, |t| n.node_type == t))
            .filter(|n| matcher.is_match(&n.name) || matcher.is_match(&n.display_path()))
            .collect();
        hits.sort_by(|a, b| a.listing_key().cmp(&b.listing_key()));
        hits.truncate(query.effective_limit());
        Ok(hits)
    }

    pub async fn create_node(&mut self, req: NewNode) -> Result<FileNode> {
        validate_name(&req.name)?;
        let parent_path = self.resolve_parent(req.project_id, req.parent_id)?;
        if req.node_type == NodeType::Folder && req.content.is_some() {
            return Err(StoreError::InvalidOperation(
                "folders cannot carry content".to_string(),
            ));
        }
        if let Some(content) = &req.content {
            self.check_content_size(content)?;
        }
        let path = join_path(parent_path.as_deref(), &req.name);
        check_path_len(&path)?;
        self.check_sibling_free(req.project_id, req.parent_id, &req.name, None)?;
        self.check_path_free(req.project_id, &path, None)?;

        let mut node = FileNode::new(
            Uuid::new_v4(),
            req.project_id,
            req.parent_id,
            req.node_type,
            req.name,
            path,
        );
        if let Some(content) = &req.content {
            let key = content_key(node.project_id, node.id, node.version);
            self.blobs.put(&key, content.as_bytes()).await?;
            node.content_key = Some(key);
            node.size = content.len() as u64;
        }
        if let Err(e) = self.collection.put(&node) {
            if let Some(key) = &node.content_key {
                self.discard_blob(key).await;
            }
            return Err(e);
        }
        self.index(node.clone());
        debug!(project = %node.project_id, id = %node.id, path = %node.path, "created node");
        self.events.send(Event::Created {
            project_id: node.project_id,
            id: node.id,
        });
        Ok(node)
    }

    /// Content of a file; empty for a file that was never written.
    pub async fn read_content(&self, id: NodeId) -> Result<String> {
        let node = self.nodes.get(&id).ok_or_else(|| StoreError::node_not_found(id))?;
        if !node.is_file() {
            return Err(StoreError::InvalidOperation(format!(
                "{} is a folder and has no content",
                node.display_path()
            )));
        }
        let Some(key) = &node.content_key else {
            return Ok(String::new());
        };
        let bytes = self.blobs.get(key).await?;
        String::from_utf8(bytes).map_err(|e| {
            StoreError::Backend(anyhow::anyhow!("content of {} is not utf-8: {}", id, e))
        })
    }

    /// Replace a file's content and bump its version.
    ///
    /// Content is written under a fresh key first; the record update is the
    /// commit point, after which the previous blob is dropped.
    pub async fn update_content(&mut self, id: NodeId, content: &str) -> Result<FileNode> {
        let node = self.nodes.get(&id).ok_or_else(|| StoreError::node_not_found(id))?;
        if !node.is_file() {
            return Err(StoreError::InvalidOperation(format!(
                "{} is a folder and has no content",
                node.display_path()
            )));
        }
        self.check_content_size(content)?;

        let mut updated = node.clone();
        updated.version += 1;
        updated.size = content.len() as u64;
        updated.updated_at = Utc::now();
        let key = content_key(updated.project_id, updated.id, updated.version);
        updated.content_key = Some(key.clone());

        self.blobs.put(&key, content.as_bytes()).await?;
        if let Err(e) = self.collection.put(&updated) {
            self.discard_blob(&key).await;
            return Err(e);
        }
        let previous = self.nodes.insert(id, updated.clone()).and_then(|n| n.content_key);
        if let Some(old_key) = previous {
            self.discard_blob(&old_key).await;
        }
        debug!(id = %id, version = updated.version, size = updated.size, "updated content");
        self.events.send(Event::Updated {
            project_id: updated.project_id,
            id,
        });
        Ok(updated)
    }

    /// Rename and/or move a node, rewriting the paths of its whole subtree.
    ///
    /// Either every affected record is persisted or none is: records already
    /// written are restored if a later write fails, and the in-memory indexes
    /// only change after all writes succeeded.
    pub fn rename_or_move(&mut self, id: NodeId, change: NodeChange) -> Result<FileNode> {
        let node = self
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::node_not_found(id))?;
        let new_name = match change.name {
            Some(name) => {
                validate_name(&name)?;
                name
            }
            None => node.name.clone(),
        };
        let new_parent = change.parent.unwrap_or(node.parent_id);
        let parent_path = self.resolve_parent(node.project_id, new_parent)?;
        if let Some(pid) = new_parent {
            if self.is_ancestor_or_self(id, pid) {
                return Err(StoreError::InvalidCycle(id));
            }
        }
        if new_name == node.name && new_parent == node.parent_id {
            return Ok(node);
        }

        let new_path = join_path(parent_path.as_deref(), &new_name);
        check_path_len(&new_path)?;
        self.check_sibling_free(node.project_id, new_parent, &new_name, Some(id))?;
        self.check_path_free(node.project_id, &new_path, Some(id))?;

        let now = Utc::now();
        let mut root = node.clone();
        root.name = new_name;
        root.parent_id = new_parent;
        root.path = new_path.clone();
        root.updated_at = now;

        let descendants = self.descendant_ids(id);
        let subtree: HashSet<NodeId> = descendants.iter().copied().chain([id]).collect();
        let mut new_paths = HashMap::from([(id, new_path.clone())]);
        let mut updates = vec![root];
        for did in descendants {
            let Some(desc) = self.nodes.get(&did) else {
                continue;
            };
            let path = match rebase_path(&desc.path, &node.path, &new_path) {
                Some(path) => path,
                None => {
                    let parent = desc.parent_id.and_then(|p| new_paths.get(&p));
                    join_path(parent.map(String::as_str), &desc.name)
                }
            };
            check_path_len(&path)?;
            if let Some(other) = self.paths.get(&(node.project_id, path.clone())) {
                if !subtree.contains(other) {
                    return Err(StoreError::Conflict(format!(
                        "{} already exists",
                        display_path(&path)
                    )));
                }
            }
            new_paths.insert(did, path.clone());
            let mut updated = desc.clone();
            updated.path = path;
            updated.updated_at = now;
            updates.push(updated);
        }

        self.persist_all(&updates)?;

        for update in &updates {
            self.unindex_path(update.id);
        }
        if node.parent_id != new_parent {
            if let Some(set) = self.children.get_mut(&(node.project_id, node.parent_id)) {
                set.remove(&id);
            }
            self.children
                .entry((node.project_id, new_parent))
                .or_default()
                .insert(id);
        }
        for update in updates.iter() {
            self.paths
                .insert((update.project_id, update.path.clone()), update.id);
            self.nodes.insert(update.id, update.clone());
        }

        debug!(
            id = %id,
            from = %node.path,
            to = %new_path,
            cascaded = updates.len() - 1,
            "renamed node"
        );
        self.events.send(Event::Moved {
            project_id: node.project_id,
            id,
        });
        Ok(updates.swap_remove(0))
    }

    /// Delete a node and, for folders, everything below it.
    ///
    /// Records are removed children-first so an interrupted delete never
    /// leaves a record pointing at a removed parent. Returns the removed ids
    /// in removal order.
    pub async fn delete_subtree(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let project_id = self
            .nodes
            .get(&id)
            .map(|n| n.project_id)
            .ok_or_else(|| StoreError::node_not_found(id))?;
        let mut order = vec![id];
        order.extend(self.descendant_ids(id));
        order.reverse();

        let mut deleted = Vec::with_capacity(order.len());
        let mut keys = Vec::new();
        let mut failure = None;
        for nid in order {
            if let Err(e) = self.collection.remove(nid) {
                failure = Some(e);
                break;
            }
            if let Some(node) = self.unindex(nid) {
                keys.extend(node.content_key);
            }
            deleted.push(nid);
        }
        for key in &keys {
            self.discard_blob(key).await;
        }
        if !deleted.is_empty() {
            self.events.send(Event::Deleted {
                project_id,
                ids: deleted.clone(),
            });
        }
        if let Some(e) = failure {
            warn!(id = %id, removed = deleted.len(), error = %e, "subtree delete interrupted");
            return Err(e);
        }
        debug!(id = %id, removed = deleted.len(), "deleted subtree");
        Ok(deleted)
    }

    /// Remove every node of a project. Returns the number of removed nodes.
    pub async fn delete_project(&mut self, project_id: ProjectId) -> Result<usize> {
        let mut removed = 0;
        for root in self.child_ids(project_id, None) {
            removed += self.delete_subtree(root).await?.len();
        }
        let leftovers: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.project_id == project_id)
            .map(|n| n.id)
            .collect();
        for id in leftovers {
            if self.nodes.contains_key(&id) {
                removed += self.delete_subtree(id).await?.len();
            }
        }
        info!(project = %project_id, removed, "deleted project nodes");
        Ok(removed)
    }

    /// Records not reachable from their project's root.
    pub fn orphan_ids(&self) -> Vec<NodeId> {
        let mut reachable = HashSet::new();
        let projects: HashSet<ProjectId> = self.nodes.values().map(|n| n.project_id).collect();
        for project_id in projects {
            let mut stack = self.child_ids(project_id, None);
            while let Some(id) = stack.pop() {
                if reachable.insert(id) {
                    stack.extend(self.child_ids(project_id, Some(id)));
                }
            }
        }
        self.nodes
            .keys()
            .filter(|id| !reachable.contains(*id))
            .copied()
            .collect()
    }

    /// Delete unreachable records left behind by an interrupted operation.
    pub async fn prune_orphans(&mut self) -> Result<Vec<NodeId>> {
        let orphans = self.orphan_ids();
        let mut pruned = Vec::with_capacity(orphans.len());
        let mut keys = Vec::new();
        let mut failure = None;
        for id in orphans {
            if let Err(e) = self.collection.remove(id) {
                failure = Some(e);
                break;
            }
            if let Some(node) = self.unindex(id) {
                keys.extend(node.content_key);
            }
            pruned.push(id);
        }
        for key in &keys {
            self.discard_blob(key).await;
        }
        if !pruned.is_empty() {
            warn!(count = pruned.len(), "pruned orphaned nodes");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(pruned),
        }
    }

    /// Ids below `id` in pre-order, excluding `id` itself.
    pub fn descendant_ids(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let project_id = node.project_id;
        let mut out = Vec::new();
        let mut stack = self.child_ids(project_id, Some(id));
        while let Some(cid) = stack.pop() {
            out.push(cid);
            stack.extend(self.child_ids(project_id, Some(cid)));
        }
        out
    }

    /// Whether `ancestor` is `node` or appears on `node`'s parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        // bounded so corrupted parent links cannot loop forever
        for _ in 0..=self.nodes.len() {
            match current {
                Some(id) if id == ancestor => return true,
                Some(id) => current = self.nodes.get(&id).and_then(|n| n.parent_id),
                None => return false,
            }
        }
        false
    }

    fn child_ids(&self, project_id: ProjectId, parent_id: Option<NodeId>) -> Vec<NodeId> {
        self.children
            .get(&(project_id, parent_id))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Validate a parent reference and return its stored path.
    fn resolve_parent(
        &self,
        project_id: ProjectId,
        parent_id: Option<NodeId>,
    ) -> Result<Option<String>> {
        let Some(pid) = parent_id else {
            return Ok(None);
        };
        let parent = self
            .nodes
            .get(&pid)
            .filter(|p| p.project_id == project_id)
            .ok_or_else(|| StoreError::NotFound(format!("parent folder {}", pid)))?;
        if !parent.is_folder() {
            return Err(StoreError::InvalidParentType(pid));
        }
        Ok(Some(parent.path.clone()))
    }

    fn check_sibling_free(
        &self,
        project_id: ProjectId,
        parent_id: Option<NodeId>,
        name: &str,
        except: Option<NodeId>,
    ) -> Result<()> {
        let taken = self
            .children
            .get(&(project_id, parent_id))
            .into_iter()
            .flatten()
            .filter(|id| Some(**id) != except)
            .filter_map(|id| self.nodes.get(id))
            .any(|n| n.name == name);
        if taken {
            return Err(StoreError::Conflict(format!(
                "a sibling named {:?} already exists",
                name
            )));
        }
        Ok(())
    }

    fn check_path_free(&self, project_id: ProjectId, path: &str, except: Option<NodeId>) -> Result<()> {
        match self.paths.get(&(project_id, path.to_string())) {
            Some(id) if Some(*id) != except => Err(StoreError::Conflict(format!(
                "{} already exists",
                display_path(path)
            ))),
            _ => Ok(()),
        }
    }

    fn check_content_size(&self, content: &str) -> Result<()> {
        if content.len() > self.config.max_content_bytes {
            return Err(StoreError::ContentTooLarge {
                size: content.len(),
                limit: self.config.max_content_bytes,
            });
        }
        Ok(())
    }

    /// Write every record, restoring the previous versions on failure.
    fn persist_all(&self, updates: &[FileNode]) -> Result<()> {
        for (written, update) in updates.iter().enumerate() {
            if let Err(e) = self.collection.put(update) {
                for prev in updates[..written].iter().rev() {
                    let Some(original) = self.nodes.get(&prev.id) else {
                        continue;
                    };
                    if let Err(re) = self.collection.put(original) {
                        warn!(id = %original.id, error = %re, "failed to restore record after aborted rename");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn index(&mut self, node: FileNode) {
        self.paths.insert((node.project_id, node.path.clone()), node.id);
        self.children
            .entry((node.project_id, node.parent_id))
            .or_default()
            .insert(node.id);
        self.nodes.insert(node.id, node);
    }

    fn unindex_path(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get(&id) {
            let key = (node.project_id, node.path.clone());
            if self.paths.get(&key) == Some(&id) {
                self.paths.remove(&key);
            }
        }
    }

    fn unindex(&mut self, id: NodeId) -> Option<FileNode> {
        self.unindex_path(id);
        let node = self.nodes.remove(&id)?;
        let parent_key = (node.project_id, node.parent_id);
        if let Some(set) = self.children.get_mut(&parent_key) {
            set.remove(&id);
            if set.is_empty() {
                self.children.remove(&parent_key);
            }
        }
        self.children.remove(&(node.project_id, Some(id)));
        Some(node)
    }

    async fn discard_blob(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            warn!(key, error = %e, "failed to delete blob");
        }
    }

    /// Recompute paths from the parent chain and persist any that drifted.
    fn repair_paths(&mut self) -> Result<()> {
        let projects: HashSet<ProjectId> = self.nodes.values().map(|n| n.project_id).collect();
        let mut repaired = Vec::new();
        for project_id in projects {
            let mut stack: Vec<(NodeId, Option<String>)> = self
                .child_ids(project_id, None)
                .into_iter()
                .map(|id| (id, None))
                .collect();
            let mut seen = HashSet::new();
            while let Some((id, parent_path)) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                let Some(node) = self.nodes.get_mut(&id) else {
                    continue;
                };
                let expected = join_path(parent_path.as_deref(), &node.name);
                if node.path != expected {
                    warn!(id = %id, stored = %node.path, expected = %expected, "repairing drifted path");
                    node.path = expected.clone();
                    repaired.push(node.clone());
                }
                for child in self.child_ids(project_id, Some(id)) {
                    stack.push((child, Some(expected.clone())));
                }
            }
        }
        for node in &repaired {
            self.collection.put(node)?;
        }
        Ok(())
    }
}
