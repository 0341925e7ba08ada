//! HTTP API over the node store and the project directory.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use codepad_core::auth::TokenVerifier;
use codepad_core::project::{Access, ProjectDirectory};
use codepad_core::storage::{FileNode, NodeId, NodeStore, NodeType, ProjectId};
use codepad_core::{ErrorKind, StoreError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::stats::StatsTracker;

mod files;
mod projects;

/// Authentication context extracted from request headers.
///
/// With a verifier configured only a valid `Authorization: Bearer` token
/// identifies the caller. Without one the `X-User-Id` header is trusted and
/// any `Authorization` header is refused, since it cannot be checked.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let authorization = headers.get(AUTHORIZATION);
        match &state.verifier {
            Some(verifier) => {
                let token = authorization
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .ok_or_else(ApiError::unauthorized)?;
                let claims = verifier
                    .verify(token)
                    .await
                    .ok_or_else(ApiError::unauthorized)?;
                Ok(Self { user_id: claims.sub })
            }
            None if authorization.is_some() => Err(ApiError::unauthorized()),
            None => headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|user_id| Self {
                    user_id: user_id.to_string(),
                })
                .ok_or_else(ApiError::unauthorized),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<NodeStore>>,
    pub projects: Arc<RwLock<ProjectDirectory>>,
    pub stats: Arc<StatsTracker>,
    /// Bearer token verifier; `None` trusts `X-User-Id`.
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

impl AppState {
    /// Fail unless `user` may access `project_id` at `access`.
    async fn authorize(&self, project_id: ProjectId, user: &str, access: Access) -> Result<(), ApiError> {
        let projects = self.projects.read().await;
        projects.require(project_id)?;
        if projects.allows(project_id, user, access) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }

    /// Authorize access to the project owning node `id`.
    async fn authorize_node(&self, id: NodeId, user: &str, access: Access) -> Result<ProjectId, ApiError> {
        let project_id = self
            .store
            .read()
            .await
            .get(id)
            .map(|n| n.project_id)
            .ok_or_else(|| StoreError::NotFound(format!("node {}", id)))?;
        self.authorize(project_id, user, access).await?;
        Ok(project_id)
    }
}

/// JSON error body `{"kind": ..., "message": ...}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthorized",
            message: "missing or invalid credentials".to_string(),
        }
    }

    fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            kind: "forbidden",
            message: "access to this project is not allowed".to_string(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::InvalidOperation.as_str(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidName
            | ErrorKind::InvalidCycle
            | ErrorKind::InvalidParentType
            | ErrorKind::InvalidOperation => StatusCode::BAD_REQUEST,
            ErrorKind::ContentTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            kind: kind.as_str(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "kind": self.kind, "message": self.message }));
        (self.status, body).into_response()
    }
}

/// A node as rendered at the API, with its display path.
#[derive(Serialize, Debug)]
pub struct NodeView {
    pub id: NodeId,
    pub project_id: ProjectId,
    pub parent_id: Option<NodeId>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub path: String,
    pub size: u64,
    pub version: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl From<&FileNode> for NodeView {
    fn from(node: &FileNode) -> Self {
        Self {
            id: node.id,
            project_id: node.project_id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            node_type: node.node_type,
            path: node.display_path(),
            size: node.size,
            version: node.version,
            created_at: node.created_at,
            updated_at: node.updated_at,
            content: None,
        }
    }
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(projects::routes())
        .merge(files::routes())
        .route("/whoami", get(whoami))
        .with_state(state)
}

async fn whoami(auth: AuthContext) -> Json<serde_json::Value> {
    Json(json!({ "user_id": auth.user_id }))
}
