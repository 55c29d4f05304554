//! Network access for intercepted requests.
//!
//! The interception handler only sees the `Network` trait; `HttpNetwork` is
//! the real implementation.

pub mod client;
pub mod error;

use async_trait::async_trait;

pub use client::HttpNetwork;
pub use error::NetworkError;

use crate::models::{PageRequest, PageResponse};

#[async_trait]
pub trait Network: Send + Sync {
    /// Send `request` and buffer the whole response.
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse, NetworkError>;
}
