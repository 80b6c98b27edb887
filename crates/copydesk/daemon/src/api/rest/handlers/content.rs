//! Content lifecycle handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use copydesk_engine::{ContentEdit, NewContent, StepOutcome};
use copydesk_storage::QueryWindow;
use copydesk_types::{Content, ContentId, ContentStatus, UserId, Workflow};
use serde::Deserialize;

/// Content list filter
#[derive(Debug, Deserialize)]
pub struct ListContentQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Edit content request
#[derive(Debug, Deserialize)]
pub struct EditContentRequest {
    pub title: Option<String>,
    pub text: Option<String>,
    pub description: Option<String>,
    /// When present, must be the creator
    pub acting_user_id: Option<UserId>,
}

/// List content, newest first
pub async fn list_content(
    State(state): State<AppState>,
    Query(query): Query<ListContentQuery>,
) -> ApiResult<Json<Vec<Content>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ContentStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let content = state
        .engine
        .list_content(status, QueryWindow::new(query.limit, query.offset))
        .await?;
    Ok(Json(content))
}

/// Create a DRAFT content item; the response carries its first verdict
pub async fn create_content(
    State(state): State<AppState>,
    Json(request): Json<NewContent>,
) -> ApiResult<(StatusCode, Json<Content>)> {
    let content = state.engine.create_content(request).await?;
    Ok((StatusCode::CREATED, Json(content)))
}

/// Get a specific content item
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Content>> {
    Ok(Json(state.engine.get_content(&ContentId::new(id)).await?))
}

/// Edit a DRAFT or CHANGES_REQUESTED item
pub async fn edit_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EditContentRequest>,
) -> ApiResult<Json<Content>> {
    let edit = ContentEdit {
        title: request.title,
        text: request.text,
        description: request.description,
    };
    let content = state
        .engine
        .edit_content(&ContentId::new(id), edit, request.acting_user_id.as_ref())
        .await?;
    Ok(Json(content))
}

/// Submit for approval; 422 with the blocking issues when the gate refuses
pub async fn submit_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StepOutcome>> {
    Ok(Json(state.engine.submit(&ContentId::new(id)).await?))
}

/// APPROVED → PUBLISHED
pub async fn publish_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Content>> {
    Ok(Json(state.engine.publish(&ContentId::new(id)).await?))
}

/// Re-run the compliance check on the current text
pub async fn recheck_compliance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Content>> {
    Ok(Json(
        state.engine.recheck_compliance(&ContentId::new(id)).await?,
    ))
}

/// The current workflow with its steps
pub async fn get_current_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Workflow>> {
    let workflow = state
        .engine
        .current_workflow(&ContentId::new(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Content {} has no workflow", id)))?;
    Ok(Json(workflow))
}

/// Every workflow for the content, current first
pub async fn list_workflows(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Workflow>>> {
    Ok(Json(
        state.engine.workflow_history(&ContentId::new(id)).await?,
    ))
}
