use serde::Serialize;

use crate::storage::node::NodeId;

/// Coarse classification of a [`StoreError`], stable across messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidName,
    InvalidCycle,
    InvalidParentType,
    InvalidOperation,
    ContentTooLarge,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::InvalidCycle => "invalid_cycle",
            ErrorKind::InvalidParentType => "invalid_parent_type",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::ContentTooLarge => "content_too_large",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("cannot move {0} into itself or one of its descendants")]
    InvalidCycle(NodeId),
    #[error("parent {0} is not a folder")]
    InvalidParentType(NodeId),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("content of {size} bytes exceeds the {limit} byte limit")]
    ContentTooLarge { size: usize, limit: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::InvalidName { .. } => ErrorKind::InvalidName,
            StoreError::InvalidCycle(_) => ErrorKind::InvalidCycle,
            StoreError::InvalidParentType(_) => ErrorKind::InvalidParentType,
            StoreError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            StoreError::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
            StoreError::Io(_) | StoreError::Serde(_) | StoreError::Backend(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn node_not_found(id: NodeId) -> Self {
        StoreError::NotFound(format!("node {}", id))
    }

    pub(crate) fn invalid_name(name: &str, reason: &'static str) -> Self {
        StoreError::InvalidName {
            name: name.to_string(),
            reason,
        }
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn kinds_map_to_stable_strings() {
        let id = Uuid::new_v4();
        assert_eq!(StoreError::node_not_found(id).kind().as_str(), "not_found");
        assert_eq!(StoreError::InvalidCycle(id).kind(), ErrorKind::InvalidCycle);
        let io = StoreError::from(std::io::Error::other("disk gone"));
        assert_eq!(io.kind(), ErrorKind::Internal);
        let backend = StoreError::from(anyhow::anyhow!("bucket missing"));
        assert_eq!(backend.kind(), ErrorKind::Internal);
        assert_eq!(backend.to_string(), "bucket missing");
    }

    #[test]
    fn invalid_name_message_includes_reason() {
        let err = StoreError::invalid_name("a/b", "contains a reserved character");
        assert_eq!(
            err.to_string(),
            "invalid name \"a/b\": contains a reserved character"
        );
    }
}
