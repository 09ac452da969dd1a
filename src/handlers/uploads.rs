use crate::db::models::{ReceiptMetadata, SourceType, UploadRecord};
use crate::error::ReciboError;
use crate::identity::AuthUser;
use crate::router::ReciboState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct MarkUploadedRequest {
    pub receipt_key: String,
    pub destination_paths: Vec<String>,
    pub metadata: Option<ReceiptMetadata>,
    #[serde(default)]
    pub source_type: SourceType,
}

#[derive(Debug, Deserialize)]
pub struct UploadStatusBatchRequest {
    pub receipt_keys: Vec<String>,
}

#[derive(Serialize)]
pub struct UploadStatusBatchResponse {
    pub statuses: HashMap<String, UploadRecord>,
}

#[derive(Serialize)]
pub struct UploadStatusResponse {
    pub receipt_key: String,
    pub record: Option<UploadRecord>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ListUploadsQuery {
    #[serde(default = "default_true")]
    pub include_uploaded: bool,
    #[serde(default = "default_true")]
    pub include_not_uploaded: bool,
}

#[derive(Serialize)]
pub struct ListUploadsResponse {
    pub receipts: Vec<UploadRecord>,
    pub count: usize,
}

/// POST /upload-tracking/mark-uploaded. Safe to call twice with the same
/// key; the second call replaces paths and metadata on the same row.
pub async fn mark_uploaded(
    State(state): State<ReciboState>,
    user: AuthUser,
    Json(req): Json<MarkUploadedRequest>,
) -> Result<Json<UploadRecord>, ReciboError> {
    let record = state
        .storage
        .mark_uploaded(
            &user.user_id,
            &req.receipt_key,
            &req.destination_paths,
            req.metadata.as_ref(),
            req.source_type,
        )
        .await?;
    Ok(Json(record))
}

/// GET /upload-tracking/status/{receipt_key}
pub async fn upload_status(
    State(state): State<ReciboState>,
    Path(receipt_key): Path<String>,
    user: AuthUser,
) -> Result<Json<UploadStatusResponse>, ReciboError> {
    let record = state.storage.upload_status(&user.user_id, &receipt_key).await?;
    Ok(Json(UploadStatusResponse {
        receipt_key,
        record,
    }))
}

/// POST /upload-tracking/get-status. Keys with no row are absent from the
/// map; absence means "not uploaded".
pub async fn upload_status_batch(
    State(state): State<ReciboState>,
    user: AuthUser,
    Json(req): Json<UploadStatusBatchRequest>,
) -> Result<Json<UploadStatusBatchResponse>, ReciboError> {
    let statuses = state
        .storage
        .upload_status_batch(&user.user_id, &req.receipt_keys)
        .await?;
    Ok(Json(UploadStatusBatchResponse { statuses }))
}

/// GET /upload-tracking/list
pub async fn list_uploads(
    State(state): State<ReciboState>,
    Query(query): Query<ListUploadsQuery>,
    user: AuthUser,
) -> Result<Json<ListUploadsResponse>, ReciboError> {
    let receipts = state
        .storage
        .list_uploads(
            &user.user_id,
            query.include_uploaded,
            query.include_not_uploaded,
        )
        .await?;
    let count = receipts.len();
    Ok(Json(ListUploadsResponse { receipts, count }))
}
