//! Outbound page requests and their cache identity.

use url::Url;

/// The only method the cache stores and answers for.
pub const CACHEABLE_METHOD: &str = "GET";

/// A request the host intends to send over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PageRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Shorthand for a bodiless `GET`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(CACHEABLE_METHOD, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the cache may store or answer this request.
    pub fn is_cacheable(&self) -> bool {
        self.method == CACHEABLE_METHOD
    }

    /// Identity of this request in a cache store.
    ///
    /// The absolute URL with any fragment removed. URLs that do not parse
    /// are used verbatim.
    pub fn cache_key(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) => {
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => self.url.clone(),
        }
    }
}
