//! Compliance check handlers

use super::PageQuery;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Query, State},
    Json,
};
use copydesk_types::{ComplianceCheck, ComplianceResult};
use serde::Deserialize;

/// Compliance check request
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub text: String,
    /// Defaults to the workflow setting
    pub use_context: Option<bool>,
}

/// Evaluate arbitrary text without touching any content item
pub async fn check_compliance(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> ApiResult<Json<ComplianceResult>> {
    let use_context = request
        .use_context
        .unwrap_or(state.engine.config().use_context);
    let result = state.engine.check_text(&request.text, use_context).await?;
    Ok(Json(result))
}

/// Audit log, newest first
pub async fn list_compliance_checks(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<ComplianceCheck>>> {
    let checks = state.compliance().list_checks(page.window()).await?;
    Ok(Json(checks))
}
