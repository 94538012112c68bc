//! likeness-store — Persistence for extraction results.
//!
//! Store contracts are traits so the backing engine is swappable; SQLite is
//! the provided implementation. The content-addressed cache memoizes
//! expensive inference results on disk.

pub mod cache;
pub mod sqlite;
pub mod store;

pub use cache::{CacheError, ContentAddressedCache};
pub use sqlite::SqliteStore;
pub use store::{FaceDistanceStore, FaceStore, PredictionStore, StoreError};
