//! Blob lifecycle: reserve, upload, mint download tokens, fetch, delete.
//!
//! Uploads and downloads are gated by scope-specific capability tokens bound
//! to the blob id and its room. View-once blobs are deleted here immediately
//! after the payload is handed off: the store records the flag, this layer
//! enforces the policy.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use tracing::info;

use crate::access;
use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::{
    clamp_ttl, BlobInitRequest, BlobInitResponse, BlobUploadResponse, DownloadTokenQuery,
    OptionalTokenQuery, TokenTtlRequest, TokenResponse,
};
use crate::tokens::{Scope, MAX_DOWNLOAD_TTL_SECS, MAX_UPLOAD_TTL_SECS};

/// POST /rooms/{room_id}/blobs
pub async fn init_blob(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<BlobInitRequest>,
) -> Result<Json<BlobInitResponse>> {
    access::resolve_room(&*state.store, &room_id).await?;

    let content_type = req
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let (blob_id, expires_at) = state
        .blobs
        .init(
            &room_id,
            &content_type,
            req.ttl_seconds,
            req.single_read,
            req.category,
        )
        .await;

    let token_ttl = (expires_at - Utc::now())
        .num_seconds()
        .min(MAX_UPLOAD_TTL_SECS);
    let upload_token = state
        .tokens
        .mint(Scope::Upload, &blob_id, &room_id, token_ttl)?;

    info!(room_id = %room_id, blob_id = %blob_id, single_read = req.single_read, "reserved blob");
    Ok(Json(BlobInitResponse {
        blob_id,
        upload_token,
        expires_at,
    }))
}

/// PUT /blobs/{blob_id}
///
/// Body is the raw ciphertext; the upload token comes in the Authorization
/// header. The reservation must still exist and belong to the token's room.
pub async fn upload_blob(
    State(state): State<AppState>,
    Path(blob_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BlobUploadResponse>> {
    let token = bearer_token(&headers)?;
    let meta = state.blobs.meta(&blob_id).await.ok_or(Error::NotFound)?;
    access::authorize(&state.tokens, token, Scope::Upload, &blob_id, &meta.room_id)?;

    let entry = state.blobs.put(&blob_id, body).await?;
    info!(blob_id = %blob_id, size = entry.size, "blob uploaded");
    Ok(Json(BlobUploadResponse {
        blob_id: entry.id,
        size: entry.size,
        expires_at: entry.expires_at,
    }))
}

/// POST /rooms/{room_id}/blobs/{blob_id}/download-token
pub async fn create_download_token(
    State(state): State<AppState>,
    Path((room_id, blob_id)): Path<(String, String)>,
    Json(req): Json<TokenTtlRequest>,
) -> Result<Json<TokenResponse>> {
    access::resolve_room(&*state.store, &room_id).await?;
    let entry = state.blobs.get(&blob_id).await.ok_or(Error::NotFound)?;
    if entry.room_id != room_id {
        return Err(Error::NotFound);
    }

    let ttl = clamp_ttl(req.ttl_seconds, 300).min(MAX_DOWNLOAD_TTL_SECS);
    let token = state
        .tokens
        .mint(Scope::Download, &blob_id, &room_id, ttl)?;
    Ok(Json(TokenResponse {
        token,
        expires_at: Utc::now() + Duration::seconds(ttl),
    }))
}

/// GET /blobs/{blob_id}?token=…
pub async fn fetch_blob(
    State(state): State<AppState>,
    Path(blob_id): Path<String>,
    Query(query): Query<DownloadTokenQuery>,
) -> Result<(HeaderMap, Bytes)> {
    let entry = state.blobs.get(&blob_id).await.ok_or(Error::NotFound)?;
    access::authorize(
        &state.tokens,
        &query.token,
        Scope::Download,
        &blob_id,
        &entry.room_id,
    )?;

    let payload = entry.payload.ok_or(Error::NotFound)?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&entry.content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );

    if entry.single_read {
        state.blobs.delete(&blob_id).await;
        info!(blob_id = %blob_id, "view-once blob destroyed after read");
    }

    Ok((headers, payload))
}

/// DELETE /rooms/{room_id}/blobs/{blob_id}?token=…
///
/// The token is optional: blob ids are 128-bit random, so knowing one is
/// itself the capability. A token that *is* supplied must still verify, under
/// either the upload or the download scope.
pub async fn delete_blob(
    State(state): State<AppState>,
    Path((room_id, blob_id)): Path<(String, String)>,
    Query(query): Query<OptionalTokenQuery>,
) -> Result<StatusCode> {
    let meta = state.blobs.meta(&blob_id).await.ok_or(Error::NotFound)?;
    if meta.room_id != room_id {
        return Err(Error::NotFound);
    }

    if let Some(token) = &query.token {
        access::authorize(&state.tokens, token, Scope::Upload, &blob_id, &room_id)
            .or_else(|_| {
                access::authorize(&state.tokens, token, Scope::Download, &blob_id, &room_id)
            })?;
    }

    state.blobs.delete(&blob_id).await;
    Ok(StatusCode::NO_CONTENT)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::Forbidden)
}
