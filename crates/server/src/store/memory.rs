use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::SessionStore;
use crate::error::Result;
use crate::models::{MessageEnvelope, Room};

struct Expiring<T> {
    value: T,
    deadline: DateTime<Utc>,
}

impl<T> Expiring<T> {
    fn live_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline > now
    }
}

/// In-memory session store with the same per-key TTL semantics as the Redis
/// implementation. Used by tests and usable as a single-instance fallback;
/// nothing survives a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    rooms: RwLock<HashMap<String, Expiring<Room>>>,
    members: RwLock<HashMap<String, Expiring<HashSet<String>>>>,
    // Message-id lists per room, most-recent-first like LPUSH.
    lists: RwLock<HashMap<String, Expiring<Vec<String>>>>,
    envelopes: RwLock<HashMap<String, Expiring<MessageEnvelope>>>,
    clock_offset_ms: RwLock<i64>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift this store's clock forward. Lets tests cross TTL boundaries
    /// without sleeping; has no effect on anything outside this store.
    pub async fn advance(&self, duration: Duration) {
        *self.clock_offset_ms.write().await += duration.num_milliseconds();
    }

    async fn now(&self) -> DateTime<Utc> {
        Utc::now() + Duration::milliseconds(*self.clock_offset_ms.read().await)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_room(&self, room: &Room, ttl_seconds: i64) -> Result<()> {
        let deadline = self.now().await + Duration::seconds(ttl_seconds.max(1));
        self.rooms.write().await.insert(
            room.id.clone(),
            Expiring {
                value: room.clone(),
                deadline,
            },
        );
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        let now = self.now().await;
        let rooms = self.rooms.read().await;
        Ok(rooms
            .get(room_id)
            .filter(|e| e.live_at(now))
            .map(|e| e.value.clone()))
    }

    async fn room_exists(&self, room_id: &str) -> Result<bool> {
        Ok(self.get_room(room_id).await?.is_some())
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        self.rooms.write().await.remove(room_id);
        self.members.write().await.remove(room_id);
        self.lists.write().await.remove(room_id);
        Ok(())
    }

    async fn add_member(
        &self,
        room_id: &str,
        member_id: &str,
        remaining_ttl_seconds: i64,
    ) -> Result<u64> {
        let now = self.now().await;
        let mut members = self.members.write().await;
        let entry = members.entry(room_id.to_string()).or_insert_with(|| Expiring {
            value: HashSet::new(),
            deadline: now,
        });
        if !entry.live_at(now) {
            entry.value.clear();
        }
        entry.value.insert(member_id.to_string());
        entry.deadline = now + Duration::seconds(remaining_ttl_seconds.max(1));
        Ok(entry.value.len() as u64)
    }

    async fn member_count(&self, room_id: &str) -> Result<u64> {
        let now = self.now().await;
        let members = self.members.read().await;
        Ok(members
            .get(room_id)
            .filter(|e| e.live_at(now))
            .map_or(0, |e| e.value.len() as u64))
    }

    async fn add_message(&self, envelope: &MessageEnvelope, ttl_seconds: i64) -> Result<()> {
        let now = self.now().await;
        let deadline = now + Duration::seconds(ttl_seconds.max(1));

        self.envelopes.write().await.insert(
            envelope.id.clone(),
            Expiring {
                value: envelope.clone(),
                deadline,
            },
        );

        let mut lists = self.lists.write().await;
        let entry = lists
            .entry(envelope.room_id.clone())
            .or_insert_with(|| Expiring {
                value: Vec::new(),
                deadline: now,
            });
        if !entry.live_at(now) {
            entry.value.clear();
        }
        entry.value.insert(0, envelope.id.clone());
        // Same trade-off as the Redis list: expiry tracks the newest message.
        entry.deadline = deadline;
        Ok(())
    }

    async fn get_messages(&self, room_id: &str) -> Result<Vec<MessageEnvelope>> {
        let now = self.now().await;
        let ids: Vec<String> = {
            let lists = self.lists.read().await;
            match lists.get(room_id).filter(|e| e.live_at(now)) {
                Some(entry) => entry.value.clone(),
                None => return Ok(Vec::new()),
            }
        };

        let envelopes = self.envelopes.read().await;
        let mut result: Vec<MessageEnvelope> = ids
            .iter()
            .filter_map(|id| envelopes.get(id))
            .filter(|e| e.live_at(now))
            .map(|e| e.value.clone())
            .filter(|env| !env.expired_at(now))
            .collect();

        result.sort_by_key(|e| e.created_at);
        Ok(result)
    }

    async fn cleanup_expired_messages(&self, room_id: &str) -> Result<u64> {
        let now = self.now().await;
        let envelopes = self.envelopes.read().await;
        let mut lists = self.lists.write().await;
        let Some(entry) = lists.get_mut(room_id).filter(|e| e.live_at(now)) else {
            return Ok(0);
        };

        let before = entry.value.len();
        entry
            .value
            .retain(|id| envelopes.get(id).is_some_and(|e| e.live_at(now)));
        Ok((before - entry.value.len()) as u64)
    }

    async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<()> {
        self.envelopes.write().await.remove(message_id);
        if let Some(entry) = self.lists.write().await.get_mut(room_id) {
            entry.value.retain(|id| id != message_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str, ttl: i64) -> Room {
        let now = Utc::now();
        Room {
            id: id.into(),
            created_at: now,
            expires_at: now + Duration::seconds(ttl),
            pin_hash: None,
            max_members: None,
        }
    }

    fn envelope(room_id: &str, ttl: i64) -> MessageEnvelope {
        MessageEnvelope::new(room_id, "ct".into(), "n".into(), None, None, None, ttl)
    }

    #[tokio::test]
    async fn room_disappears_after_ttl() {
        let store = MemorySessionStore::new();
        store.create_room(&room("r1", 60), 60).await.unwrap();
        assert!(store.room_exists("r1").await.unwrap());

        store.advance(Duration::seconds(61)).await;
        assert!(!store.room_exists("r1").await.unwrap());
        assert!(store.get_room("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn member_set_counts_distinct_members() {
        let store = MemorySessionStore::new();
        assert_eq!(store.add_member("r1", "alice", 60).await.unwrap(), 1);
        assert_eq!(store.add_member("r1", "bob", 60).await.unwrap(), 2);
        // Re-joining is not a new member.
        assert_eq!(store.add_member("r1", "alice", 60).await.unwrap(), 2);
        assert_eq!(store.member_count("r1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn member_set_expires_with_its_ttl() {
        let store = MemorySessionStore::new();
        store.add_member("r1", "alice", 30).await.unwrap();

        store.advance(Duration::seconds(31)).await;
        assert_eq!(store.member_count("r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn messages_come_back_sorted_by_creation_time() {
        let store = MemorySessionStore::new();
        let first = envelope("r1", 300);
        let mut second = envelope("r1", 300);
        let mut third = envelope("r1", 300);
        // Force distinct, ordered timestamps.
        second.created_at = first.created_at + Duration::milliseconds(10);
        third.created_at = first.created_at + Duration::milliseconds(20);

        // Insert out of order.
        store.add_message(&third, 300).await.unwrap();
        store.add_message(&first, 300).await.unwrap();
        store.add_message(&second, 300).await.unwrap();

        let messages = store.get_messages("r1").await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].id, first.id);
        assert_eq!(messages[1].id, second.id);
        assert_eq!(messages[2].id, third.id);
    }

    #[tokio::test]
    async fn expired_envelope_is_skipped_on_read() {
        let store = MemorySessionStore::new();
        store.add_message(&envelope("r1", 30), 30).await.unwrap();
        store.add_message(&envelope("r1", 300), 300).await.unwrap();
        assert_eq!(store.get_messages("r1").await.unwrap().len(), 2);

        store.advance(Duration::seconds(31)).await;
        let remaining = store.get_messages("r1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].ttl_seconds, 300);
    }

    #[tokio::test]
    async fn list_expiry_tracks_last_message_ttl() {
        // Known trade-off: a short-TTL message added after a long-TTL one
        // drags the list's expiry down, making the earlier message
        // unreachable via listing while its envelope is still alive.
        let store = MemorySessionStore::new();
        let long_lived = envelope("r1", 300);
        store.add_message(&long_lived, 300).await.unwrap();
        store.add_message(&envelope("r1", 30), 30).await.unwrap();

        store.advance(Duration::seconds(31)).await;
        assert!(store.get_messages("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_prunes_orphaned_list_ids() {
        let store = MemorySessionStore::new();
        let short = envelope("r1", 30);
        let long = envelope("r1", 300);
        store.add_message(&short, 30).await.unwrap();
        store.add_message(&long, 300).await.unwrap();

        store.advance(Duration::seconds(31)).await;
        // The short envelope is gone but its id still sits in the list.
        assert_eq!(store.cleanup_expired_messages("r1").await.unwrap(), 1);
        assert_eq!(store.cleanup_expired_messages("r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_message_removes_envelope_and_list_entry() {
        let store = MemorySessionStore::new();
        let env = envelope("r1", 300);
        store.add_message(&env, 300).await.unwrap();

        store.delete_message("r1", &env.id).await.unwrap();
        assert!(store.get_messages("r1").await.unwrap().is_empty());
    }
}
