use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

/// Errors returned by the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The id is unknown, expired, or was never filled.
    #[error("blob not found")]
    NotFound,
    /// The payload exceeds the configured maximum size.
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// What kind of content a blob holds. Vault items are isolated from normal
/// chat attachments so clients can render them behind an extra step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Attachment,
    Vault,
}

/// A stored blob and its metadata.
///
/// An entry without a payload is a reservation made by [`BlobStore::init`]
/// that has not been filled yet; readers cannot distinguish it from an absent
/// entry.
#[derive(Clone, Debug, Serialize)]
pub struct BlobEntry {
    pub id: String,
    pub room_id: String,
    pub content_type: String,
    pub size: u64,
    /// The TTL window granted at init time, in seconds. A successful `put`
    /// resets `expires_at` to now + this window, so upload latency does not
    /// eat into the advertised lifetime.
    pub ttl_seconds: i64,
    pub expires_at: DateTime<Utc>,
    pub single_read: bool,
    pub category: Category,
    #[serde(skip)]
    pub payload: Option<Bytes>,
}

impl BlobEntry {
    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    fn filled(&self) -> bool {
        self.payload.is_some()
    }
}

/// Blob store tunables.
#[derive(Clone, Debug)]
pub struct BlobConfig {
    /// Hard ceiling on payload size. Exceeding it rejects the upload,
    /// never truncates.
    pub max_payload_bytes: usize,
    /// TTL used when the caller supplies none, or an invalid one.
    pub default_ttl_seconds: i64,
    pub min_ttl_seconds: i64,
    pub max_ttl_seconds: i64,
    /// Interval between background sweep passes.
    pub sweep_interval: std::time::Duration,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 10 * 1024 * 1024,
            default_ttl_seconds: 3600,
            min_ttl_seconds: 30,
            max_ttl_seconds: 86_400,
            sweep_interval: std::time::Duration::from_secs(30),
        }
    }
}

/// In-memory blob store with TTL enforcement.
///
/// Cloning is cheap; all clones share the same map and sweeper. The sweeper
/// task is started on construction and runs until [`BlobStore::shutdown`] is
/// called.
#[derive(Clone)]
pub struct BlobStore {
    entries: Arc<RwLock<HashMap<String, BlobEntry>>>,
    config: BlobConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl BlobStore {
    /// Create a store and start its background sweeper.
    pub fn new(config: BlobConfig) -> Self {
        let entries: Arc<RwLock<HashMap<String, BlobEntry>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let store = Self {
            entries,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        };

        tokio::spawn(sweeper_task(store.clone(), shutdown_rx));
        store
    }

    /// Reserve a new blob id with a TTL window. No payload is stored yet;
    /// until [`put`](Self::put) succeeds the entry is invisible to readers.
    pub async fn init(
        &self,
        room_id: &str,
        content_type: &str,
        ttl_seconds: Option<i64>,
        single_read: bool,
        category: Category,
    ) -> (String, DateTime<Utc>) {
        let ttl = self.clamp_ttl(ttl_seconds);
        let id = random_id();
        let expires_at = Utc::now() + Duration::seconds(ttl);

        let entry = BlobEntry {
            id: id.clone(),
            room_id: room_id.to_string(),
            content_type: content_type.to_string(),
            size: 0,
            ttl_seconds: ttl,
            expires_at,
            single_read,
            category,
            payload: None,
        };

        self.entries.write().await.insert(id.clone(), entry);
        debug!(blob_id = %id, ttl, single_read, "reserved blob");
        (id, expires_at)
    }

    /// Store the payload for a previously reserved id.
    ///
    /// Resets the expiry to now + the original TTL window. Concurrent puts on
    /// the same id are last-write-wins.
    pub async fn put(&self, id: &str, payload: Bytes) -> Result<BlobEntry, BlobError> {
        if payload.len() > self.config.max_payload_bytes {
            return Err(BlobError::PayloadTooLarge {
                size: payload.len(),
                limit: self.config.max_payload_bytes,
            });
        }

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id).ok_or(BlobError::NotFound)?;
        if entry.expired_at(now) {
            entries.remove(id);
            return Err(BlobError::NotFound);
        }

        entry.size = payload.len() as u64;
        entry.payload = Some(payload);
        entry.expires_at = now + Duration::seconds(entry.ttl_seconds);
        let result = entry.clone();
        debug!(blob_id = %id, size = result.size, "stored blob payload");
        Ok(result)
    }

    /// Fetch a filled, unexpired entry. Expired entries are evicted on the
    /// spot (read-triggered GC, independent of the sweep).
    pub async fn get(&self, id: &str) -> Option<BlobEntry> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            Some(entry) if entry.expired_at(now) => {
                entries.remove(id);
                None
            }
            Some(entry) if entry.filled() => Some(entry.clone()),
            _ => None,
        }
    }

    /// Fetch entry metadata whether or not the payload has arrived, with the
    /// payload stripped. For the access layer only: upload authorization must
    /// see reserved entries that `get` hides.
    pub async fn meta(&self, id: &str) -> Option<BlobEntry> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            Some(entry) if entry.expired_at(now) => {
                entries.remove(id);
                None
            }
            Some(entry) => Some(BlobEntry {
                payload: None,
                ..entry.clone()
            }),
            None => None,
        }
    }

    /// Remove an entry. Idempotent; returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.entries.write().await.remove(id).is_some();
        if removed {
            debug!(blob_id = %id, "deleted blob");
        }
        removed
    }

    /// Evict every expired entry. Called periodically by the sweeper; also
    /// callable directly.
    ///
    /// Snapshots candidate ids under the read lock, then removes them under
    /// the write lock with a fresh expiry re-check, so a concurrent `put`
    /// that refreshed an entry's deadline is never clobbered.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let candidates: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .values()
                .filter(|e| e.expired_at(now))
                .map(|e| e.id.clone())
                .collect()
        };

        if candidates.is_empty() {
            return 0;
        }

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for id in candidates {
            if entries.get(&id).is_some_and(|e| e.expired_at(now)) {
                entries.remove(&id);
                removed += 1;
            }
        }
        drop(entries);

        if removed > 0 {
            debug!(removed, "sweep evicted expired blobs");
        }
        removed
    }

    /// Number of live entries, including unfilled reservations.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Stop the background sweeper. Entries remain readable; only the
    /// periodic eviction stops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn clamp_ttl(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(ttl) if ttl > 0 => ttl.clamp(self.config.min_ttl_seconds, self.config.max_ttl_seconds),
            _ => self.config.default_ttl_seconds,
        }
    }

    #[cfg(test)]
    async fn force_expire(&self, id: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

async fn sweeper_task(store: BlobStore, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(store.config.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.sweep().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("blob sweeper stopped");
                    return;
                }
            }
        }
    }
}

fn random_id() -> String {
    let id: u128 = rand::thread_rng().gen();
    format!("{id:032x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BlobConfig {
        BlobConfig {
            max_payload_bytes: 1024,
            default_ttl_seconds: 60,
            ..BlobConfig::default()
        }
    }

    #[tokio::test]
    async fn reserved_entry_is_invisible_to_readers() {
        let store = BlobStore::new(test_config());
        let (id, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Attachment)
            .await;

        assert!(store.get(&id).await.is_none());
        // The access layer can still see the reservation.
        assert!(store.meta(&id).await.is_some());
    }

    #[tokio::test]
    async fn put_then_get_returns_payload() {
        let store = BlobStore::new(test_config());
        let (id, _) = store
            .init("room-1", "application/octet-stream", Some(60), false, Category::Attachment)
            .await;

        let entry = store.put(&id, Bytes::from_static(b"ciphertext")).await.unwrap();
        assert_eq!(entry.size, 10);

        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.payload.unwrap(), Bytes::from_static(b"ciphertext"));
        assert_eq!(fetched.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn put_resets_expiry_to_original_window() {
        let store = BlobStore::new(test_config());
        let (id, reserved_expiry) = store
            .init("room-1", "text/plain", Some(120), false, Category::Attachment)
            .await;

        // Simulate upload latency by pulling the deadline closer.
        {
            let mut entries = store.entries.write().await;
            entries.get_mut(&id).unwrap().expires_at = Utc::now() + Duration::seconds(5);
        }

        let entry = store.put(&id, Bytes::from_static(b"x")).await.unwrap();
        assert!(entry.expires_at >= reserved_expiry - Duration::seconds(1));
        assert!(entry.expires_at > Utc::now() + Duration::seconds(100));
    }

    #[tokio::test]
    async fn put_rejects_oversized_payload() {
        let store = BlobStore::new(test_config());
        let (id, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Attachment)
            .await;

        let big = Bytes::from(vec![0u8; 2048]);
        match store.put(&id, big).await {
            Err(BlobError::PayloadTooLarge { size, limit }) => {
                assert_eq!(size, 2048);
                assert_eq!(limit, 1024);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_on_unknown_id_is_not_found() {
        let store = BlobStore::new(test_config());
        assert!(matches!(
            store.put("missing", Bytes::from_static(b"x")).await,
            Err(BlobError::NotFound)
        ));
    }

    #[tokio::test]
    async fn get_evicts_expired_entry() {
        let store = BlobStore::new(test_config());
        let (id, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Attachment)
            .await;
        store.put(&id, Bytes::from_static(b"x")).await.unwrap();

        store.force_expire(&id).await;
        assert!(store.get(&id).await.is_none());
        // Lazy eviction actually removed the entry, not just hid it.
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = BlobStore::new(test_config());
        let (id, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Attachment)
            .await;

        assert!(store.delete(&id).await);
        assert!(!store.delete(&id).await);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn sweep_evicts_expired_entries_including_unfilled() {
        let store = BlobStore::new(test_config());
        let (expired_filled, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Attachment)
            .await;
        store.put(&expired_filled, Bytes::from_static(b"x")).await.unwrap();
        let (expired_reserved, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Vault)
            .await;
        let (live, _) = store
            .init("room-1", "text/plain", Some(60), false, Category::Attachment)
            .await;
        store.put(&live, Bytes::from_static(b"y")).await.unwrap();

        store.force_expire(&expired_filled).await;
        store.force_expire(&expired_reserved).await;

        assert_eq!(store.sweep().await, 2);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&live).await.is_some());
    }

    #[tokio::test]
    async fn invalid_ttl_falls_back_to_default() {
        let store = BlobStore::new(test_config());
        let (_, expires_at) = store
            .init("room-1", "text/plain", Some(-5), false, Category::Attachment)
            .await;
        let granted = (expires_at - Utc::now()).num_seconds();
        assert!((58..=60).contains(&granted));
    }

    #[tokio::test]
    async fn requested_ttl_is_clamped_to_bounds() {
        let store = BlobStore::new(test_config());
        let (_, expires_at) = store
            .init("room-1", "text/plain", Some(1_000_000), false, Category::Attachment)
            .await;
        let granted = (expires_at - Utc::now()).num_seconds();
        assert!(granted <= 86_400);
    }
}
