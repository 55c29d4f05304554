//! Data models for intercepted traffic.
//!
//! - `PageRequest`: an outbound request as seen by the interception handler
//! - `PageResponse`: a fully buffered response, from the network or the cache

pub mod request;
pub mod response;

pub use request::PageRequest;
pub use response::PageResponse;
