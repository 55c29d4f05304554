//! Network-first interception with cache fallback.
//!
//! For every intercepted request the handler starts a cache lookup and a
//! network fetch side by side. A successful fetch always wins and refreshes
//! the cache in the background; the cached copy is only served when the
//! network produced no response at all.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::cache::{CacheStorage, CachedResponse};
use crate::models::{PageRequest, PageResponse};
use crate::network::{Network, NetworkError};

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("Network unavailable and nothing cached for {url}: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error("Interception worker is not running")]
    WorkerStopped,
}

/// What to do with the network when the cache lookup itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupFailurePolicy {
    /// Use the outcome of the fetch that is already in flight.
    #[default]
    #[serde(rename = "reuse")]
    ReuseInFlight,
    /// Issue a second, independent fetch and use its outcome.
    #[serde(rename = "refetch")]
    Refetch,
}

/// Where an answer came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Served {
    Network(PageResponse),
    Cache(CachedResponse),
}

impl Served {
    pub fn response(&self) -> &PageResponse {
        match self {
            Served::Network(response) => response,
            Served::Cache(cached) => &cached.data,
        }
    }

    pub fn into_response(self) -> PageResponse {
        match self {
            Served::Network(response) => response,
            Served::Cache(cached) => cached.into_data(),
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(self, Served::Cache(_))
    }

    /// Short label for headers and logs.
    pub fn source(&self) -> &'static str {
        match self {
            Served::Network(_) => "network",
            Served::Cache(_) => "cache",
        }
    }
}

/// The priority rule: a network response wins; otherwise the cached copy.
///
/// With neither available the network failure is handed back unchanged.
pub fn network_or_fallback(
    network: Result<PageResponse, NetworkError>,
    fallback: Option<CachedResponse>,
) -> Result<Served, NetworkError> {
    match (network, fallback) {
        (Ok(response), _) => Ok(Served::Network(response)),
        (Err(_), Some(cached)) => Ok(Served::Cache(cached)),
        (Err(e), None) => Err(e),
    }
}

pub struct Interceptor {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    cache_name: String,
    lookup_failure: LookupFailurePolicy,
    pending_writes: TaskTracker,
}

impl Interceptor {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        cache_name: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            network,
            cache_name: cache_name.into(),
            lookup_failure: LookupFailurePolicy::default(),
            pending_writes: TaskTracker::new(),
        }
    }

    pub fn with_lookup_failure(mut self, policy: LookupFailurePolicy) -> Self {
        self.lookup_failure = policy;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Produce the answer for one intercepted request.
    ///
    /// The lookup and the fetch are both started before either finishes and
    /// both run to completion.
    pub async fn handle(&self, request: &PageRequest) -> Result<Served, HandleError> {
        let (lookup, network) = futures::join!(
            self.storage.match_request(request),
            self.request_over_network(request),
        );

        let outcome = match lookup {
            Ok(cached) => network_or_fallback(network, cached),
            Err(e) => {
                error!(url = %request.url, error = %e, "Cache lookup failed, using network only");
                let network = match self.lookup_failure {
                    LookupFailurePolicy::ReuseInFlight => network,
                    LookupFailurePolicy::Refetch => self.request_over_network(request).await,
                };
                network.map(Served::Network)
            }
        };

        match outcome {
            Ok(Served::Cache(cached)) => {
                debug!(url = %request.url, age = %cached.age_display(), "Serving cached copy");
                Ok(Served::Cache(cached))
            }
            Ok(served) => Ok(served),
            Err(source) => Err(HandleError::Unavailable {
                url: request.url.clone(),
                source,
            }),
        }
    }

    /// Fetch `request` and, on success, store a copy in the named cache.
    ///
    /// The cache write runs in the background; its result never reaches the
    /// caller. Fetch failures are logged and returned as-is.
    pub async fn request_over_network(
        &self,
        request: &PageRequest,
    ) -> Result<PageResponse, NetworkError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_in_background(request, response.clone());
                Ok(response)
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Network fetch failed");
                Err(e)
            }
        }
    }

    fn store_in_background(&self, request: &PageRequest, response: PageResponse) {
        if !request.is_cacheable() {
            debug!(method = %request.method, url = %request.url, "Not caching non-GET response");
            return;
        }

        let storage = Arc::clone(&self.storage);
        let cache_name = self.cache_name.clone();
        let request = PageRequest::new(request.method.clone(), request.url.clone());

        self.pending_writes.spawn(async move {
            let result = async {
                let cache = storage.open(&cache_name).await?;
                cache.put(&request, response).await
            }
            .await;

            match result {
                Ok(()) => debug!(url = %request.url, cache = %cache_name, "Cache updated"),
                Err(e) => debug!(url = %request.url, error = %e, "Cache write failed"),
            }
        });
    }

    /// Number of cache writes still running.
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.len()
    }

    /// Wait until every cache write started so far has finished.
    pub async fn settle_writes(&self) {
        self.pending_writes.close();
        self.pending_writes.wait().await;
        self.pending_writes.reopen();
    }
}
