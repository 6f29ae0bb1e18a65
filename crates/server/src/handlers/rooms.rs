//! Room lifecycle: create, inspect, join, invite, delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::access;
use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::{
    clamp_ttl, CreateRoomRequest, CreateRoomResponse, TokenTtlRequest, JoinRequest, JoinResponse,
    Room, RoomInfo, TokenResponse,
};
use crate::tokens::{Scope, MAX_JOIN_TTL_SECS};

/// POST /rooms
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>> {
    if req.max_members == Some(0) {
        return Err(Error::Validation("max_members must be positive".into()));
    }
    if req.pin.as_deref() == Some("") {
        return Err(Error::Validation("pin must not be empty".into()));
    }

    let ttl = clamp_ttl(req.ttl_seconds, state.config.default_room_ttl_secs);
    let pin_hash = match &req.pin {
        Some(pin) => Some(bcrypt::hash(pin, bcrypt::DEFAULT_COST)?),
        None => None,
    };

    let now = Utc::now();
    let room = Room {
        id: Uuid::new_v4().to_string(),
        created_at: now,
        expires_at: now + Duration::seconds(ttl),
        pin_hash,
        max_members: req.max_members,
    };
    state.store.create_room(&room, ttl).await?;

    info!(room_id = %room.id, ttl, "created room");
    Ok(Json(CreateRoomResponse {
        room_id: room.id,
        expires_at: room.expires_at,
    }))
}

/// GET /rooms/{room_id}
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomInfo>> {
    let room = access::resolve_room(&*state.store, &room_id).await?;
    let member_count = state.store.member_count(&room_id).await?;
    Ok(Json(RoomInfo::from_room(&room, member_count)))
}

/// POST /rooms/{room_id}/join
///
/// A valid invite token admits without the PIN; otherwise the PIN (if the
/// room has one) must match. The member cap applies either way.
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JoinResponse>> {
    let room = access::resolve_room(&*state.store, &room_id).await?;

    let via_invite = match &req.token {
        Some(token) => {
            access::authorize(&state.tokens, token, Scope::Join, &room_id, &room_id)?;
            true
        }
        None => false,
    };
    if !via_invite {
        access::check_pin(&room, req.pin.as_deref())?;
    }

    let current = state.store.member_count(&room_id).await?;
    access::check_capacity(&room, current)?;

    let member_id = req
        .member_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let remaining = room
        .remaining_ttl_seconds(Utc::now())
        .ok_or(Error::NotFound)?;
    let member_count = state
        .store
        .add_member(&room_id, &member_id, remaining)
        .await?;

    info!(room_id = %room_id, member_count, "member joined");
    Ok(Json(JoinResponse {
        room_id,
        member_id,
        member_count,
    }))
}

/// POST /rooms/{room_id}/invite
pub async fn create_invite(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<TokenTtlRequest>,
) -> Result<Json<TokenResponse>> {
    access::resolve_room(&*state.store, &room_id).await?;

    let ttl = clamp_ttl(req.ttl_seconds, 3600).min(MAX_JOIN_TTL_SECS);
    let token = state.tokens.mint(Scope::Join, &room_id, &room_id, ttl)?;
    Ok(Json(TokenResponse {
        token,
        expires_at: Utc::now() + Duration::seconds(ttl),
    }))
}

/// DELETE /rooms/{room_id}
pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode> {
    state.store.delete_room(&room_id).await?;
    info!(room_id = %room_id, "deleted room");
    Ok(StatusCode::NO_CONTENT)
}
