//! File and folder endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use codepad_core::project::Access;
use codepad_core::search::{SearchMode, SearchQuery};
use codepad_core::storage::{FileNode, NewNode, NodeChange, NodeId, NodeType, ProjectId, TreeNode};
use serde::{Deserialize, Serialize};

use super::{double_option, ApiError, AppState, AuthContext, NodeView};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/{pid}/tree", get(get_tree))
        .route("/projects/{pid}/files", post(create_file))
        .route("/projects/{pid}/files/lookup", get(lookup))
        .route("/projects/{pid}/children", get(list_children))
        .route("/projects/{pid}/search", get(search))
        .route(
            "/files/{id}",
            get(get_file).patch(update_file).delete(delete_file),
        )
        .route("/files/{id}/content", axum::routing::put(put_content))
}

#[derive(Deserialize)]
struct CreateFileRequest {
    name: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    parent_id: Option<NodeId>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpdateFileRequest {
    #[serde(default)]
    name: Option<String>,
    /// Absent keeps the parent, `null` moves to the root.
    #[serde(default, deserialize_with = "double_option")]
    parent_id: Option<Option<NodeId>>,
}

#[derive(Deserialize)]
struct ContentRequest {
    content: String,
}

#[derive(Deserialize)]
struct LookupParams {
    path: String,
}

#[derive(Deserialize)]
struct ChildrenParams {
    parent: Option<NodeId>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default)]
    regex: bool,
    #[serde(rename = "type")]
    node_type: Option<NodeType>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: Vec<NodeId>,
}

async fn get_tree(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
) -> Result<Json<Vec<TreeNode>>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Read).await?;
    let store = state.store.read().await;
    Ok(Json(store.build_tree(pid)))
}

async fn create_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
    Json(req): Json<CreateFileRequest>,
) -> Result<(StatusCode, Json<NodeView>), ApiError> {
    state.authorize(pid, &auth.user_id, Access::Write).await?;
    let new = NewNode {
        project_id: pid,
        name: req.name,
        node_type: req.node_type,
        parent_id: req.parent_id,
        content: req.content,
    };
    let node = create_in_project(&state, new).await?;
    Ok((StatusCode::CREATED, Json(NodeView::from(&node))))
}

/// Create a node while the store is locked, failing if the project record
/// was removed after the caller was authorized.
pub(super) async fn create_in_project(state: &AppState, new: NewNode) -> Result<FileNode, ApiError> {
    let mut store = state.store.write().await;
    state.projects.read().await.require(new.project_id)?;
    Ok(store.create_node(new).await?)
}

async fn lookup(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
    Query(params): Query<LookupParams>,
) -> Result<Json<NodeView>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Read).await?;
    let store = state.store.read().await;
    store
        .find_by_path(pid, &params.path)
        .map(|n| Json(NodeView::from(n)))
        .ok_or_else(|| {
            codepad_core::StoreError::NotFound(format!("path {}", params.path)).into()
        })
}

async fn list_children(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
    Query(params): Query<ChildrenParams>,
) -> Result<Json<Vec<NodeView>>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Read).await?;
    let store = state.store.read().await;
    let children = store.list_children(pid, params.parent)?;
    Ok(Json(children.into_iter().map(NodeView::from).collect()))
}

async fn search(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<NodeView>>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Read).await?;
    let query = SearchQuery {
        pattern: params.q,
        mode: if params.regex {
            SearchMode::Regex
        } else {
            SearchMode::Substring
        },
        node_type: params.node_type,
        limit: params.limit,
    };
    let store = state.store.read().await;
    let hits = store.search(pid, &query)?;
    Ok(Json(hits.into_iter().map(NodeView::from).collect()))
}

async fn get_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<NodeId>,
) -> Result<Json<NodeView>, ApiError> {
    state.authorize_node(id, &auth.user_id, Access::Read).await?;
    let store = state.store.read().await;
    let node = store
        .get(id)
        .ok_or_else(|| codepad_core::StoreError::NotFound(format!("node {}", id)))?;
    let mut view = NodeView::from(node);
    if node.is_file() {
        view.content = Some(store.read_content(id).await?);
    }
    Ok(Json(view))
}

async fn update_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<NodeId>,
    Json(req): Json<UpdateFileRequest>,
) -> Result<Json<NodeView>, ApiError> {
    if req.name.is_none() && req.parent_id.is_none() {
        return Err(ApiError::bad_request("nothing to change: give name and/or parent_id"));
    }
    state.authorize_node(id, &auth.user_id, Access::Write).await?;
    let change = NodeChange {
        name: req.name,
        parent: req.parent_id,
    };
    let node = state.store.write().await.rename_or_move(id, change)?;
    Ok(Json(NodeView::from(&node)))
}

async fn put_content(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<NodeId>,
    Json(req): Json<ContentRequest>,
) -> Result<Json<NodeView>, ApiError> {
    state.authorize_node(id, &auth.user_id, Access::Write).await?;
    let node = state.store.write().await.update_content(id, &req.content).await?;
    Ok(Json(NodeView::from(&node)))
}

async fn delete_file(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<NodeId>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.authorize_node(id, &auth.user_id, Access::Write).await?;
    let deleted = state.store.write().await.delete_subtree(id).await?;
    Ok(Json(DeleteResponse { deleted }))
}
