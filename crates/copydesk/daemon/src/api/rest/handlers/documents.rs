//! Policy document ingestion handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

/// Index document request
#[derive(Debug, Deserialize)]
pub struct IndexDocumentRequest {
    /// Re-using an id replaces the earlier document
    pub document_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Index document response
#[derive(Debug, Serialize)]
pub struct IndexDocumentResponse {
    pub document_id: String,
    pub indexed: bool,
}

/// Add a policy document to the retrieval index
pub async fn index_document(
    State(state): State<AppState>,
    Json(request): Json<IndexDocumentRequest>,
) -> ApiResult<(StatusCode, Json<IndexDocumentResponse>)> {
    let document_id = request
        .document_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    state
        .documents
        .index(&document_id, &request.text, request.metadata)
        .await?;

    tracing::info!(document_id = %document_id, "Indexed policy document");

    Ok((
        StatusCode::CREATED,
        Json(IndexDocumentResponse {
            document_id,
            indexed: true,
        }),
    ))
}

/// Remove a policy document from the retrieval index
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.documents.delete(&id).await? {
        return Err(ApiError::NotFound(format!("Document {} not found", id)));
    }
    tracing::info!(document_id = %id, "Deleted policy document");
    Ok(StatusCode::NO_CONTENT)
}
