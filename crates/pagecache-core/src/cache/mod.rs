//! Response caching for offline access.
//!
//! This module provides the `CacheStorage` / `Cache` traits the interception
//! handler reads and writes, plus two backends:
//! - `DiskCacheStorage`: persists entries as JSON files, survives restarts
//! - `MemoryCacheStorage`: process-local, for tests and ephemeral runs

pub mod disk;
pub mod entry;
pub mod error;
pub mod memory;
pub mod storage;

pub use disk::DiskCacheStorage;
pub use entry::{CachedData, CachedResponse};
pub use error::CacheError;
pub use memory::MemoryCacheStorage;
pub use storage::{Cache, CacheStorage};
