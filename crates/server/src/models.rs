use chrono::{DateTime, Duration, Utc};
use ember_blob::Category;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Floor for every user-supplied TTL, in seconds.
pub const MIN_TTL_SECS: i64 = 30;
/// Ceiling for every user-supplied TTL, in seconds.
pub const MAX_TTL_SECS: i64 = 86_400;

/// Clamp a requested TTL to `[MIN_TTL_SECS, MAX_TTL_SECS]`, falling back to
/// `default` when absent or non-positive.
pub fn clamp_ttl(requested: Option<i64>, default: i64) -> i64 {
    match requested {
        Some(ttl) if ttl > 0 => ttl.clamp(MIN_TTL_SECS, MAX_TTL_SECS),
        _ => default,
    }
}

/// A room record as stored in the session store. The pin hash round-trips
/// through storage but is never exposed over HTTP; see [`RoomInfo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pin_hash: Option<String>,
    pub max_members: Option<u64>,
}

impl Room {
    /// Seconds of life the room has left, or `None` once expired. Used to
    /// derive member-set TTLs so membership never outlives the room.
    pub fn remaining_ttl_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        let remaining = (self.expires_at - now).num_seconds();
        (remaining > 0).then_some(remaining)
    }
}

/// Public room metadata (no pin hash).
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub has_pin: bool,
    pub max_members: Option<u64>,
    pub member_count: u64,
}

impl RoomInfo {
    pub fn from_room(room: &Room, member_count: u64) -> Self {
        Self {
            id: room.id.clone(),
            created_at: room.created_at,
            expires_at: room.expires_at,
            has_pin: room.pin_hash.is_some(),
            max_members: room.max_members,
            member_count,
        }
    }
}

/// An encrypted message as stored and returned. The server never interprets
/// the ciphertext, nonce, salt, or tag fields; they are opaque client data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: String,
    pub room_id: String,
    pub ciphertext: String,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    pub expires_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Build an envelope with a fresh id: `{room_id}:{unix_millis}:{suffix}`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_id: &str,
        ciphertext: String,
        nonce: String,
        salt: Option<String>,
        tag: Option<String>,
        sender_id: Option<String>,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
        Self {
            id: format!("{room_id}:{}:{suffix:06x}", now.timestamp_millis()),
            room_id: room_id.to_string(),
            ciphertext,
            nonce,
            salt,
            tag,
            sender_id,
            created_at: now,
            ttl_seconds,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// --- Request / response bodies ---

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub ttl_seconds: Option<i64>,
    pub pin: Option<String>,
    pub max_members: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub member_id: Option<String>,
    pub pin: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub room_id: String,
    pub member_id: String,
    pub member_count: u64,
}

/// Body for token-minting endpoints (invites and download tokens).
#[derive(Debug, Deserialize)]
pub struct TokenTtlRequest {
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub ciphertext: String,
    pub nonce: String,
    pub salt: Option<String>,
    pub tag: Option<String>,
    pub sender_id: Option<String>,
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BlobInitRequest {
    pub content_type: Option<String>,
    pub ttl_seconds: Option<i64>,
    #[serde(default)]
    pub single_read: bool,
    #[serde(default)]
    pub category: Category,
}

#[derive(Debug, Serialize)]
pub struct BlobInitResponse {
    pub blob_id: String,
    pub upload_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BlobUploadResponse {
    pub blob_id: String,
    pub size: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadTokenQuery {
    pub token: String,
}

/// Query shape for operations where the token may be omitted (blob delete).
#[derive(Debug, Deserialize, Default)]
pub struct OptionalTokenQuery {
    pub token: Option<String>,
}
