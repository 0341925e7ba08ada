use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use codepad_core::project::{Access, Project};
use codepad_core::storage::ProjectId;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState, AuthContext};
use crate::stats::ProjectStats;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{pid}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/projects/{pid}/stats", get(project_stats))
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    is_public: bool,
}

#[derive(Deserialize)]
struct UpdateProjectRequest {
    name: Option<String>,
    is_public: Option<bool>,
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: ProjectStats,
    summary: String,
}

async fn create_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = state
        .projects
        .write()
        .await
        .create(&req.name, &auth.user_id, req.is_public)?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Json<Vec<Project>> {
    let projects = state.projects.read().await;
    Json(
        projects
            .list_visible(&auth.user_id)
            .into_iter()
            .cloned()
            .collect(),
    )
}

async fn get_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
) -> Result<Json<Project>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Read).await?;
    let projects = state.projects.read().await;
    Ok(Json(projects.require(pid)?.clone()))
}

async fn update_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Write).await?;
    let project = state
        .projects
        .write()
        .await
        .update(pid, req.name.as_deref(), req.is_public)?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
) -> Result<StatusCode, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Write).await?;
    // the store stays locked until the record is gone, so no create can
    // slip in between; nodes go first so none outlives its project
    let removed = {
        let mut store = state.store.write().await;
        let removed = store.delete_project(pid).await?;
        state.projects.write().await.delete(pid)?;
        removed
    };
    state.stats.forget(pid).await;
    info!(project = %pid, removed, "deleted project");
    Ok(StatusCode::NO_CONTENT)
}

async fn project_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(pid): Path<ProjectId>,
) -> Result<Json<StatsResponse>, ApiError> {
    state.authorize(pid, &auth.user_id, Access::Read).await?;
    let stats = state.stats.get(pid).await;
    let summary = stats.summary();
    Ok(Json(StatsResponse { stats, summary }))
}
