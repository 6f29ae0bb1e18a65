//! Message envelopes: send, list, delete. The server stores and returns
//! ciphertext fields only; it never inspects them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use crate::access;
use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::{clamp_ttl, MessageEnvelope, SendMessageRequest};

/// POST /rooms/{room_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageEnvelope>> {
    access::resolve_room(&*state.store, &room_id).await?;

    if req.ciphertext.is_empty() {
        return Err(Error::Validation("ciphertext must not be empty".into()));
    }
    if req.nonce.is_empty() {
        return Err(Error::Validation("nonce must not be empty".into()));
    }

    let ttl = clamp_ttl(req.ttl_seconds, state.config.default_message_ttl_secs);
    let envelope = MessageEnvelope::new(
        &room_id,
        req.ciphertext,
        req.nonce,
        req.salt,
        req.tag,
        req.sender_id,
        ttl,
    );
    state.store.add_message(&envelope, ttl).await?;

    debug!(room_id = %room_id, message_id = %envelope.id, ttl, "stored message");
    Ok(Json(envelope))
}

/// GET /rooms/{room_id}/messages
///
/// Compacts the id list first, then returns the surviving envelopes sorted
/// by creation time ascending.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<MessageEnvelope>>> {
    access::resolve_room(&*state.store, &room_id).await?;

    let pruned = state.store.cleanup_expired_messages(&room_id).await?;
    if pruned > 0 {
        debug!(room_id = %room_id, pruned, "compacted message list");
    }

    let messages = state.store.get_messages(&room_id).await?;
    Ok(Json(messages))
}

/// DELETE /rooms/{room_id}/messages/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    access::resolve_room(&*state.store, &room_id).await?;
    state.store.delete_message(&room_id, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
