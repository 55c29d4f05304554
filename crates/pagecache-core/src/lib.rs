//! Core library for pagecache.
//!
//! Network-first request interception with an offline cache fallback:
//! every intercepted request is fetched from the network and the fresh
//! response is written to a named cache store; when the network yields
//! nothing, the most recent cached copy is served instead.

pub mod cache;
pub mod config;
pub mod handler;
pub mod models;
pub mod network;
pub mod worker;

pub use cache::{Cache, CacheError, CacheStorage, CachedResponse, DiskCacheStorage, MemoryCacheStorage};
pub use config::Config;
pub use handler::{network_or_fallback, HandleError, Interceptor, LookupFailurePolicy, Served};
pub use models::{PageRequest, PageResponse};
pub use network::{HttpNetwork, Network, NetworkError};
pub use worker::{FetchEvent, Worker, WorkerHandle};
