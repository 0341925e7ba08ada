//! Project file trees: node records, their persistence and content blobs.

pub mod blob;
pub mod collection;
pub mod node;
pub mod store;
pub mod validation;


pub use blob::{BlobStorage, FsBlobStorage, MemoryBlobStorage, S3BlobStorage};
pub use collection::{DiskCollection, MemoryCollection, NodeCollection};
pub use node::{FileNode, NewNode, NodeChange, NodeId, NodeType, ProjectId, TreeNode};
pub use store::{NodeStore, StoreConfig};
