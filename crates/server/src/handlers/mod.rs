//! HTTP handlers. Thin wrappers: each one runs the access-control gate
//! (resolve, verify token, join checks) and then performs a single store
//! operation.

pub mod blobs;
pub mod messages;
pub mod rooms;

pub use blobs::{create_download_token, delete_blob, fetch_blob, init_blob, upload_blob};
pub use messages::{delete_message, list_messages, send_message};
pub use rooms::{create_invite, create_room, delete_room, get_room, join_room};
