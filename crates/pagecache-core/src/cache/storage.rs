//! Cache storage traits.
//!
//! `CacheStorage` is the root holding any number of named stores; `Cache`
//! is one named store. Backends implement both.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CacheError, CachedResponse};
use crate::models::{PageRequest, PageResponse};

/// Root of all named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Search every named store for a response to `request`.
    ///
    /// `Ok(None)` is a miss. `Err` means the lookup layer itself failed.
    async fn match_request(&self, request: &PageRequest)
        -> Result<Option<CachedResponse>, CacheError>;

    /// Open the named store, creating it if it does not exist yet.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, CacheError>;

    /// Remove the named store and everything in it. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;
}

/// A single named store of responses keyed by request identity.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn match_request(&self, request: &PageRequest)
        -> Result<Option<CachedResponse>, CacheError>;

    /// Store `response` under `request`'s key, replacing any previous entry.
    async fn put(&self, request: &PageRequest, response: PageResponse) -> Result<(), CacheError>;
}

/// Store names become directory names on disk, so keep them to one plain segment.
pub fn validate_name(name: &str) -> Result<(), CacheError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Reject pairs the cache must not hold.
pub fn check_storable(request: &PageRequest, response: &PageResponse) -> Result<(), CacheError> {
    if !request.is_cacheable() {
        return Err(CacheError::UnsupportedMethod(request.method.clone()));
    }
    if response.is_partial() {
        return Err(CacheError::PartialContent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("pagecache-v1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }

    #[test]
    fn test_check_storable() {
        let get = PageRequest::get("https://example.com/");
        let post = PageRequest::new("POST", "https://example.com/");

        assert!(check_storable(&get, &PageResponse::ok("x")).is_ok());
        assert!(check_storable(&get, &PageResponse::new(404, "gone")).is_ok());
        assert!(matches!(
            check_storable(&post, &PageResponse::ok("x")),
            Err(CacheError::UnsupportedMethod(m)) if m == "POST"
        ));
        assert!(matches!(
            check_storable(&get, &PageResponse::new(206, "x")),
            Err(CacheError::PartialContent)
        ));
    }
}
