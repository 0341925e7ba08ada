use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::display_path;

pub type NodeId = Uuid;
pub type ProjectId = Uuid;

/// Whether a node is a file or a folder. Fixed at creation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Folder,
}

impl NodeType {
    /// Sort rank: folders list before files.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            NodeType::Folder => 0,
            NodeType::File => 1,
        }
    }
}

/// Sort key shared by tree listings and search results: folders first, then
/// name, then path.
pub(crate) fn listing_key<'a>(
    node_type: NodeType,
    name: &'a str,
    path: &'a str,
) -> (u8, &'a str, &'a str) {
    (node_type.rank(), name, path)
}

/// A single file or folder record.
///
/// `path` is a cached value derived from the `parent_id` chain and is stored
/// without a leading separator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileNode {
    pub id: NodeId,
    pub project_id: ProjectId,
    pub parent_id: Option<NodeId>,
    pub node_type: NodeType,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub content_key: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileNode {
    pub(crate) fn new(
        id: NodeId,
        project_id: ProjectId,
        parent_id: Option<NodeId>,
        node_type: NodeType,
        name: String,
        path: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            parent_id,
            node_type,
            name,
            path,
            content_key: None,
            size: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    /// Path with a leading `/`, as exposed at the API boundary.
    pub fn display_path(&self) -> String {
        display_path(&self.path)
    }

    pub(crate) fn listing_key(&self) -> (u8, &str, &str) {
        listing_key(self.node_type, &self.name, &self.path)
    }
}

/// Request to create a node.
#[derive(Clone, Debug)]
pub struct NewNode {
    pub project_id: ProjectId,
    pub name: String,
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    pub content: Option<String>,
}

impl NewNode {
    pub fn file(project_id: ProjectId, parent_id: Option<NodeId>, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            node_type: NodeType::File,
            parent_id,
            content: None,
        }
    }

    pub fn folder(
        project_id: ProjectId,
        parent_id: Option<NodeId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            name: name.into(),
            node_type: NodeType::Folder,
            parent_id,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Rename and/or move request.
///
/// `parent: Some(None)` moves the node to the project root, `parent: None`
/// keeps the current parent.
#[derive(Clone, Debug, Default)]
pub struct NodeChange {
    pub name: Option<String>,
    pub parent: Option<Option<NodeId>>,
}

impl NodeChange {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parent: None,
        }
    }

    pub fn move_to(parent: Option<NodeId>) -> Self {
        Self {
            name: None,
            parent: Some(parent),
        }
    }
}

/// A node together with its ordered children, as returned by tree building.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub path: String,
    pub parent_id: Option<NodeId>,
    pub size: u64,
    pub version: u64,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub(crate) fn leaf(node: &FileNode) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            node_type: node.node_type,
            path: node.display_path(),
            parent_id: node.parent_id,
            size: node.size,
            version: node.version,
            children: Vec::new(),
        }
    }

    pub(crate) fn listing_key(&self) -> (u8, &str, &str) {
        listing_key(self.node_type, &self.name, &self.path)
    }
}
