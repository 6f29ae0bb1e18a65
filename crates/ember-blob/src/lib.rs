//! Ephemeral Blob Storage
//!
//! In-memory storage for opaque encrypted payloads with enforced lifetimes.
//! Every entry carries an expiry deadline; expired entries are evicted both
//! lazily on read and by a periodic background sweep owned by the store.
//!
//! Nothing here survives a process restart. That is the point.

mod store;

pub use store::{BlobConfig, BlobEntry, BlobError, BlobStore, Category};
