use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use super::{members_key, message_key, messages_key, room_key, SessionStore};
use crate::error::Result;
use crate::models::{MessageEnvelope, Room};

/// Redis-backed session store. Relies on Redis's native `EX`/`EXPIRE` for
/// every key, so expiry needs no manual enforcement here except the
/// read-path re-check on message envelopes.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect and start the reconnecting connection manager.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("connected to session cache at {url}");
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create_room(&self, room: &Room, ttl_seconds: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(room)?;
        let _: () = conn
            .set_ex(room_key(&room.id), json, ttl_seconds.max(1) as u64)
            .await?;
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(room_key(room_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(room_key(room_id)).await?;
        Ok(exists)
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(vec![
                room_key(room_id),
                members_key(room_id),
                messages_key(room_id),
            ])
            .await?;
        Ok(())
    }

    async fn add_member(
        &self,
        room_id: &str,
        member_id: &str,
        remaining_ttl_seconds: i64,
    ) -> Result<u64> {
        let mut conn = self.conn.clone();
        let key = members_key(room_id);
        let _: () = conn.sadd(&key, member_id).await?;
        let _: () = conn.expire(&key, remaining_ttl_seconds.max(1)).await?;
        let count: u64 = conn.scard(&key).await?;
        Ok(count)
    }

    async fn member_count(&self, room_id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.scard(members_key(room_id)).await?;
        Ok(count)
    }

    async fn add_message(&self, envelope: &MessageEnvelope, ttl_seconds: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl = ttl_seconds.max(1);
        let json = serde_json::to_string(envelope)?;

        // Two independent writes; a crash in between leaves either an
        // orphaned list id (skipped on read) or an unreachable envelope
        // (expires on its own).
        let _: () = conn
            .set_ex(message_key(&envelope.id), json, ttl as u64)
            .await?;

        let key = messages_key(&envelope.room_id);
        let _: () = conn.lpush(&key, &envelope.id).await?;
        let _: () = conn.expire(&key, ttl).await?;
        Ok(())
    }

    async fn get_messages(&self, room_id: &str) -> Result<Vec<MessageEnvelope>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(messages_key(room_id), 0, -1).await?;

        let now = Utc::now();
        let mut envelopes = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn.get(message_key(&id)).await?;
            let Some(json) = json else { continue };
            match serde_json::from_str::<MessageEnvelope>(&json) {
                Ok(envelope) if !envelope.expired_at(now) => envelopes.push(envelope),
                Ok(_) => {}
                Err(e) => warn!(message_id = %id, "skipping undecodable envelope: {e}"),
            }
        }

        envelopes.sort_by_key(|e| e.created_at);
        Ok(envelopes)
    }

    async fn cleanup_expired_messages(&self, room_id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let key = messages_key(room_id);
        let ids: Vec<String> = conn.lrange(&key, 0, -1).await?;

        let mut pruned = 0;
        for id in ids {
            let exists: bool = conn.exists(message_key(&id)).await?;
            if !exists {
                let removed: u64 = conn.lrem(&key, 0, &id).await?;
                pruned += removed;
            }
        }
        Ok(pruned)
    }

    async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(message_key(message_id)).await?;
        let _: u64 = conn.lrem(messages_key(room_id), 0, message_id).await?;
        Ok(())
    }
}
