//! Approval step handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use copydesk_engine::{PendingApproval, StepOutcome};
use copydesk_types::{ApprovalStep, Comment, Role, StepId, UserId};
use serde::Deserialize;

/// Approve request; the body may be omitted entirely
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproveRequest {
    pub acting_user_id: Option<UserId>,
}

/// Reject request
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub acting_user_id: Option<UserId>,
    #[serde(default)]
    pub feedback: String,
}

/// Add comment request
#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub author_id: UserId,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub role: Option<String>,
}

/// Get a specific step
pub async fn get_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApprovalStep>> {
    Ok(Json(state.engine.get_step(&StepId::new(id)).await?))
}

/// Approve the in-progress step
pub async fn approve_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<StepOutcome>> {
    let request = parse_approve_body(&body)?;
    let outcome = state
        .engine
        .approve(&StepId::new(id), request.acting_user_id.as_ref())
        .await?;
    Ok(Json(outcome))
}

/// An empty body approves without naming a user; anything else must parse.
fn parse_approve_body(body: &[u8]) -> ApiResult<ApproveRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApproveRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid approve request: {e}")))
}

/// Reject the in-progress step; feedback is mandatory
pub async fn reject_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> ApiResult<Json<StepOutcome>> {
    let outcome = state
        .engine
        .reject(
            &StepId::new(id),
            request.acting_user_id.as_ref(),
            &request.feedback,
        )
        .await?;
    Ok(Json(outcome))
}

/// Comments on a step, oldest first
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Comment>>> {
    Ok(Json(state.engine.list_comments(&StepId::new(id)).await?))
}

/// Append a comment to a step
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AddCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .engine
        .add_comment(&StepId::new(id), &request.author_id, &request.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// In-progress steps, optionally only those awaiting `?role=`
pub async fn pending_approvals(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<Vec<PendingApproval>>> {
    let role = query
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    Ok(Json(state.engine.pending_approvals(role).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_approve_body_defaults() {
        assert!(parse_approve_body(b"").unwrap().acting_user_id.is_none());
        assert!(parse_approve_body(b" \n").unwrap().acting_user_id.is_none());
        assert!(parse_approve_body(b"{}").unwrap().acting_user_id.is_none());
    }

    #[test]
    fn malformed_approve_body_is_rejected() {
        for body in [
            &br#"{"acting_user_id": 42}"#[..],
            &br#"{"acting_user": "u-1"}"#[..],
            &b"{not json"[..],
        ] {
            assert!(matches!(
                parse_approve_body(body),
                Err(ApiError::BadRequest(_))
            ));
        }
        let request = parse_approve_body(br#"{"acting_user_id": "u-1"}"#).unwrap();
        assert_eq!(request.acting_user_id.unwrap().as_str(), "u-1");
    }
}
