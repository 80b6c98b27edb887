//! Policy rule management handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use copydesk_types::{PolicyRule, PolicyRuleDraft, PolicyRuleId};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ListRulesQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// List policy rules in evaluation order
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<ListRulesQuery>,
) -> ApiResult<Json<Vec<PolicyRule>>> {
    let rules = state.compliance().rules().list(query.include_inactive).await?;
    Ok(Json(rules))
}

/// Create a policy rule
pub async fn create_rule(
    State(state): State<AppState>,
    Json(draft): Json<PolicyRuleDraft>,
) -> ApiResult<(StatusCode, Json<PolicyRule>)> {
    let rule = state.compliance().rules().create(draft).await?;
    tracing::info!(rule_id = %rule.id, pattern = %rule.pattern, "Created policy rule");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Replace the content of a policy rule
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<PolicyRuleDraft>,
) -> ApiResult<Json<PolicyRule>> {
    let rule = state
        .compliance()
        .rules()
        .update(&PolicyRuleId::new(id), draft)
        .await?;
    tracing::info!(rule_id = %rule.id, "Updated policy rule");
    Ok(Json(rule))
}

/// Deactivate a policy rule; it stays listed with `include_inactive`
pub async fn deactivate_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PolicyRule>> {
    let rule = state
        .compliance()
        .rules()
        .deactivate(&PolicyRuleId::new(id))
        .await?;
    tracing::info!(rule_id = %rule.id, "Deactivated policy rule");
    Ok(Json(rule))
}
