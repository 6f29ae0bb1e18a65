//! Ember Server Library
//!
//! Ephemeral rooms with vanishing encrypted messages and view-once blobs.
//! The server stores only ciphertext, enforces TTLs everywhere, and grants
//! access through stateless signed capability tokens.

pub mod access;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod store;
pub mod tokens;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{AppState, ServerConfig};
use ember_blob::BlobStore;
use handlers::{
    create_download_token, create_invite, create_room, delete_blob, delete_message, delete_room,
    fetch_blob, get_room, init_blob, join_room, list_messages, send_message, upload_blob,
};
use store::{RedisSessionStore, SessionStore};

/// Build the full route table over the given state. Separated from [`run`]
/// so tests can drive the router directly.
pub fn router(state: AppState) -> Router {
    // Leave headroom above the blob ceiling so the store, not the body
    // limit, produces the 413 for payloads just over the cap.
    let body_limit = state.config.max_blob_bytes * 2;

    Router::new()
        // Rooms
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", get(get_room).delete(delete_room))
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/invite", post(create_invite))
        // Messages
        .route(
            "/rooms/{room_id}/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}",
            delete(delete_message),
        )
        // Blobs
        .route("/rooms/{room_id}/blobs", post(init_blob))
        .route(
            "/rooms/{room_id}/blobs/{blob_id}/download-token",
            post(create_download_token),
        )
        .route("/rooms/{room_id}/blobs/{blob_id}", delete(delete_blob))
        .route("/blobs/{blob_id}", put(upload_blob).get(fetch_blob))
        // Health check
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let config = ServerConfig::from_env();
    info!("=== Ember Server ===");
    info!("Features: Ephemeral rooms | Vanishing messages | View-once blobs | Capability tokens");

    let store: Arc<dyn SessionStore> =
        Arc::new(RedisSessionStore::connect(&config.redis_url).await?);
    let blobs = BlobStore::new(config.blob_config());
    info!(
        "Blob store ready (max {} bytes, sweep every {:?})",
        config.max_blob_bytes, config.sweep_interval
    );

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, store, blobs.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Ember server listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the blob sweeper with the server.
    blobs.shutdown();
    info!("Ember server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn health_check() -> &'static str {
    "OK - Ember Server"
}
