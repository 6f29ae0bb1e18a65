//! Session store: rooms, member sets, and message envelopes.
//!
//! Backed by a remote cache with native per-key expiry so the data survives
//! server restarts within its TTL, unlike the in-process blob store. The
//! trait seam lets tests (or single-instance deployments) run against an
//! in-memory implementation with the same TTL semantics.
//!
//! Key patterns:
//!
//! ```text
//! room:{id}            → Room JSON, expires with the room TTL
//! room:{id}:members    → set of member ids, expiry refreshed to the room's remaining TTL
//! room:{id}:messages   → list of message ids, expiry reset to the last message's TTL
//! msg:{id}             → MessageEnvelope JSON, expires with the message TTL
//! ```

mod memory;
mod redis_store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

use crate::error::Result;
use crate::models::{MessageEnvelope, Room};
use async_trait::async_trait;

pub(crate) fn room_key(room_id: &str) -> String {
    format!("room:{room_id}")
}

pub(crate) fn members_key(room_id: &str) -> String {
    format!("room:{room_id}:members")
}

pub(crate) fn messages_key(room_id: &str) -> String {
    format!("room:{room_id}:messages")
}

pub(crate) fn message_key(message_id: &str) -> String {
    format!("msg:{message_id}")
}

/// Storage operations for rooms, membership, and message envelopes.
///
/// Each operation is an independent round trip; there are no multi-key
/// transactions. [`add_message`](SessionStore::add_message) in particular
/// performs two writes (envelope, then list push) that can be split by a
/// crash; readers tolerate the resulting orphans.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write a room record with the store's native expiry set to
    /// `ttl_seconds`.
    async fn create_room(&self, room: &Room, ttl_seconds: i64) -> Result<()>;

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>>;

    async fn room_exists(&self, room_id: &str) -> Result<bool>;

    /// Remove the room record plus its member set and message list. Envelope
    /// keys are left to expire on their own TTLs.
    async fn delete_room(&self, room_id: &str) -> Result<()>;

    /// Add a member and refresh the member set's expiry to the room's
    /// remaining TTL, so the set never outlives the room. Returns the member
    /// count after the add.
    async fn add_member(
        &self,
        room_id: &str,
        member_id: &str,
        remaining_ttl_seconds: i64,
    ) -> Result<u64>;

    async fn member_count(&self, room_id: &str) -> Result<u64>;

    /// Store an envelope under its own expiring key, then push its id onto
    /// the room's message list. The list's expiry is reset to this message's
    /// TTL, deliberately tracking the last-added message, which can let the
    /// list expire while longer-lived envelopes are still alive.
    async fn add_message(&self, envelope: &MessageEnvelope, ttl_seconds: i64) -> Result<()>;

    /// Resolve the room's message list to envelopes, skipping ids whose
    /// envelope is gone and envelopes whose own expiry has passed, sorted by
    /// creation time ascending.
    async fn get_messages(&self, room_id: &str) -> Result<Vec<MessageEnvelope>>;

    /// Prune list ids whose backing envelope key no longer exists. The list
    /// does not compact itself when the cache expires only the envelope key.
    /// Returns the number of ids removed.
    async fn cleanup_expired_messages(&self, room_id: &str) -> Result<u64>;

    async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<()>;
}
