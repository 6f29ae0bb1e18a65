//! Server configuration and shared state.

use rand::RngCore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::store::SessionStore;
use crate::tokens::TokenCodec;
use ember_blob::BlobStore;

/// Configuration for the Ember server, read from `EMBER_*` environment
/// variables with sensible defaults.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub redis_url: String,
    /// Scope-specific token secrets. When unset in the environment a random
    /// secret is generated, which confines tokens to this instance.
    pub join_secret: Vec<u8>,
    pub upload_secret: Vec<u8>,
    pub download_secret: Vec<u8>,
    /// Hard ceiling on blob payloads in bytes.
    pub max_blob_bytes: usize,
    pub sweep_interval: std::time::Duration,
    pub default_room_ttl_secs: i64,
    pub default_blob_ttl_secs: i64,
    pub default_message_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            join_secret: random_secret(),
            upload_secret: random_secret(),
            download_secret: random_secret(),
            max_blob_bytes: 10 * 1024 * 1024,
            sweep_interval: std::time::Duration::from_secs(30),
            default_room_ttl_secs: 3600,
            default_blob_ttl_secs: 3600,
            default_message_ttl_secs: 300,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parsed("EMBER_BIND_ADDR", defaults.bind_addr),
            redis_url: std::env::var("EMBER_REDIS_URL").unwrap_or(defaults.redis_url),
            join_secret: secret_from_env("EMBER_JOIN_SECRET"),
            upload_secret: secret_from_env("EMBER_UPLOAD_SECRET"),
            download_secret: secret_from_env("EMBER_DOWNLOAD_SECRET"),
            max_blob_bytes: env_parsed("EMBER_MAX_BLOB_BYTES", defaults.max_blob_bytes),
            sweep_interval: std::time::Duration::from_secs(env_parsed(
                "EMBER_SWEEP_INTERVAL_SECS",
                30,
            )),
            default_room_ttl_secs: env_parsed(
                "EMBER_DEFAULT_ROOM_TTL_SECS",
                defaults.default_room_ttl_secs,
            ),
            default_blob_ttl_secs: env_parsed(
                "EMBER_DEFAULT_BLOB_TTL_SECS",
                defaults.default_blob_ttl_secs,
            ),
            default_message_ttl_secs: env_parsed(
                "EMBER_DEFAULT_MESSAGE_TTL_SECS",
                defaults.default_message_ttl_secs,
            ),
        }
    }

    pub fn token_codec(&self) -> TokenCodec {
        TokenCodec::new(&self.join_secret, &self.upload_secret, &self.download_secret)
    }

    pub fn blob_config(&self) -> ember_blob::BlobConfig {
        ember_blob::BlobConfig {
            max_payload_bytes: self.max_blob_bytes,
            default_ttl_seconds: self.default_blob_ttl_secs,
            sweep_interval: self.sweep_interval,
            ..ember_blob::BlobConfig::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn secret_from_env(name: &str) -> Vec<u8> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value.into_bytes(),
        _ => {
            warn!("{name} not set; using a random secret, tokens will not verify across instances");
            random_secret()
        }
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// App state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn SessionStore>,
    pub blobs: BlobStore,
    pub tokens: Arc<TokenCodec>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn SessionStore>, blobs: BlobStore) -> Self {
        let tokens = Arc::new(config.token_codec());
        Self {
            config: Arc::new(config),
            store,
            blobs,
            tokens,
        }
    }
}
