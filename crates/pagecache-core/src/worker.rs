//! The long-lived interception worker.
//!
//! `Worker::install` is called once at startup. It spawns a dispatch loop
//! that receives one `FetchEvent` per intercepted request and answers each
//! on its own task, so slow pages never hold up other events.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::handler::{HandleError, Interceptor, Served};
use crate::models::PageRequest;

/// Buffer size for the event channel.
/// Senders wait once this many events are queued.
const EVENT_BUFFER_SIZE: usize = 64;

type Reply = oneshot::Sender<Result<Served, HandleError>>;

/// One intercepted request plus the slot its answer goes into.
pub struct FetchEvent {
    request: PageRequest,
    reply: Reply,
}

impl FetchEvent {
    pub fn new(request: PageRequest) -> (Self, oneshot::Receiver<Result<Served, HandleError>>) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }

    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    /// Supply the eventual answer. A caller that already went away is ignored.
    pub fn respond_with(self, outcome: Result<Served, HandleError>) {
        if self.reply.send(outcome).is_err() {
            debug!(url = %self.request.url, "Requester gone before response was ready");
        }
    }
}

pub struct Worker;

impl Worker {
    /// Register `interceptor` as the handler for every dispatched event.
    pub fn install(interceptor: Arc<Interceptor>) -> WorkerHandle {
        let (events, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let in_flight = TaskTracker::new();
        let task = tokio::spawn(Self::run(rx, Arc::clone(&interceptor), in_flight.clone()));
        info!(cache = %interceptor.cache_name(), "Interception worker installed");

        WorkerHandle {
            events,
            interceptor,
            in_flight,
            task: Arc::new(tokio::sync::Mutex::new(Some(task))),
        }
    }

    async fn run(
        mut rx: mpsc::Receiver<FetchEvent>,
        interceptor: Arc<Interceptor>,
        in_flight: TaskTracker,
    ) {
        while let Some(event) = rx.recv().await {
            let interceptor = Arc::clone(&interceptor);
            in_flight.spawn(async move {
                let outcome = interceptor.handle(event.request()).await;
                event.respond_with(outcome);
            });
        }
        debug!("Event channel closed, dispatch loop exiting");
    }
}

/// Cloneable entry point for submitting intercepted requests.
#[derive(Clone)]
pub struct WorkerHandle {
    events: mpsc::Sender<FetchEvent>,
    interceptor: Arc<Interceptor>,
    in_flight: TaskTracker,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerHandle {
    /// Submit `request` and wait for its answer.
    pub async fn dispatch(&self, request: PageRequest) -> Result<Served, HandleError> {
        let (event, rx) = FetchEvent::new(request);
        self.events
            .send(event)
            .await
            .map_err(|_| HandleError::WorkerStopped)?;
        rx.await.map_err(|_| HandleError::WorkerStopped)?
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    /// Stop accepting events, finish the ones in flight and drain cache writes.
    ///
    /// Clones of this handle that are still alive keep their sender, so the
    /// loop is stopped through the join handle rather than by channel close.
    pub async fn shutdown(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.in_flight.close();
        self.in_flight.wait().await;
        self.interceptor.settle_writes().await;
        info!("Interception worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::cache::{CacheStorage, MemoryCacheStorage};
    use crate::models::PageResponse;
    use crate::network::{Network, NetworkError};

    /// Echoes the request path back after a short delay.
    struct EchoNetwork {
        delay: Duration,
    }

    #[async_trait]
    impl Network for EchoNetwork {
        async fn fetch(&self, request: &PageRequest) -> Result<PageResponse, NetworkError> {
            tokio::time::sleep(self.delay).await;
            if request.url.contains("offline") {
                return Err(NetworkError::Unavailable("offline".into()));
            }
            Ok(PageResponse::ok(request.url.as_str()))
        }
    }

    fn install(storage: Arc<MemoryCacheStorage>, delay: Duration) -> WorkerHandle {
        let interceptor = Interceptor::new(storage, Arc::new(EchoNetwork { delay }), "test");
        Worker::install(Arc::new(interceptor))
    }

    #[tokio::test]
    async fn test_dispatch_returns_handler_answer() {
        let worker = install(Arc::new(MemoryCacheStorage::new()), Duration::ZERO);

        let served = worker
            .dispatch(PageRequest::get("https://example.com/a"))
            .await
            .expect("served");

        assert_eq!(served.response().text(), "https://example.com/a");
    }

    #[tokio::test]
    async fn test_dispatch_propagates_rejection() {
        let worker = install(Arc::new(MemoryCacheStorage::new()), Duration::ZERO);

        let err = worker
            .dispatch(PageRequest::get("https://example.com/offline"))
            .await
            .unwrap_err();

        assert!(matches!(err, HandleError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_events_are_handled_concurrently() {
        let worker = install(Arc::new(MemoryCacheStorage::new()), Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        let (a, b, c) = tokio::join!(
            worker.dispatch(PageRequest::get("https://example.com/1")),
            worker.dispatch(PageRequest::get("https://example.com/2")),
            worker.dispatch(PageRequest::get("https://example.com/3")),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_shutdown_drains_cache_writes() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let worker = install(storage.clone(), Duration::ZERO);
        let request = PageRequest::get("https://example.com/page");

        worker.dispatch(request.clone()).await.expect("served");
        worker.shutdown().await;

        let hit = storage.match_request(&request).await.expect("lookup");
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_fails() {
        let worker = install(Arc::new(MemoryCacheStorage::new()), Duration::ZERO);
        worker.shutdown().await;

        let err = worker
            .dispatch(PageRequest::get("https://example.com/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, HandleError::WorkerStopped));
    }

    #[tokio::test]
    async fn test_respond_with_ignores_dropped_requester() {
        let (event, rx) = FetchEvent::new(PageRequest::get("https://example.com/a"));
        drop(rx);
        event.respond_with(Err(HandleError::WorkerStopped));
    }
}
