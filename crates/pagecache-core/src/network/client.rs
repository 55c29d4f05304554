//! HTTP network backend built on `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::{debug, warn};

use super::{Network, NetworkError};
use crate::models::{PageRequest, PageResponse};

/// Fetches requests over HTTP(S).
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a client. `timeout` of `None` leaves requests unbounded.
    pub fn new(timeout: Option<Duration>) -> Result<Self, NetworkError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(NetworkError::Transport)?;
        Ok(Self { client })
    }

    fn request_headers(request: &PageRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "Dropping invalid request header"),
            }
        }
        headers
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse, NetworkError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| NetworkError::InvalidRequest(format!("bad method {}", request.method)))?;

        debug!(method = %method, url = %request.url, "Fetching");
        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(Self::request_headers(request));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(NetworkError::Transport)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(NetworkError::Body)?;

        Ok(PageResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_headers_skip_invalid() {
        let request = PageRequest::get("https://example.com/")
            .with_header("accept", "text/html")
            .with_header("bad header", "x")
            .with_header("x-multi", "a")
            .with_header("x-multi", "b");

        let headers = HttpNetwork::request_headers(&request);
        assert_eq!(headers.get("accept").map(|v| v.as_bytes()), Some(&b"text/html"[..]));
        assert_eq!(headers.get_all("x-multi").iter().count(), 2);
        assert_eq!(headers.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_method_is_rejected_before_sending() {
        let network = HttpNetwork::new(None).expect("client");
        let request = PageRequest::new("BAD METHOD", "https://example.com/");
        let err = network.fetch(&request).await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let network = HttpNetwork::new(Some(Duration::from_secs(5))).expect("client");
        // Port 9 (discard) on loopback is closed on typical hosts.
        let err = network
            .fetch(&PageRequest::get("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Transport(_)));
    }
}
