//! Buffered page responses.

use serde::{Deserialize, Serialize};

/// Status the cache refuses to store.
pub const PARTIAL_CONTENT: u16 = 206;

/// A response with its body fully read.
///
/// Network bodies are single-read streams; once buffered here, `clone()` is
/// the duplication step that lets one copy go to the cache and the other
/// back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

impl PageResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A `200 OK` response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_partial(&self) -> bool {
        self.status == PARTIAL_CONTENT
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = PageResponse::ok("hi").with_header("Content-Type", "text/html");
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_body_is_stored_as_base64() {
        let response = PageResponse::ok(vec![0u8, 159, 146, 150]);
        let json = serde_json::to_string(&response).expect("serialize");
        assert!(json.contains("\"AJ+Slg==\""), "unexpected encoding: {}", json);

        let back: PageResponse = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, response);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let json = r#"{"status":200,"headers":[],"body":"not base64!"}"#;
        assert!(serde_json::from_str::<PageResponse>(json).is_err());
    }

    #[test]
    fn test_partial_content() {
        assert!(PageResponse::new(206, "").is_partial());
        assert!(!PageResponse::ok("").is_partial());
    }
}
