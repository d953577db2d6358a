//! Mock transport for testing purposes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use super::{ByteStream, Transport, TransportFailure, TransportRequest, TransportResponse};

type Handler =
    dyn Fn(&TransportRequest) -> Result<TransportResponse, TransportFailure> + Send + Sync;

/// A scripted transport that records every call it receives.
///
/// GraphQL requests are answered by a handler closure; download URLs are
/// served from an in-memory table of chunked files.
pub struct MockTransport {
    endpoint: String,
    handler: Box<Handler>,
    latency: Duration,
    chunk_delay: Duration,
    files: Mutex<HashMap<String, Vec<Bytes>>>,
    sent: Mutex<Vec<(Instant, TransportRequest)>>,
    stream_calls: AtomicUsize,
    streams: Arc<StreamGauge>,
}

#[derive(Debug, Default)]
struct StreamGauge {
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl StreamGauge {
    fn enter(self: &Arc<Self>) -> StreamGuard {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(open, Ordering::SeqCst);
        StreamGuard(Arc::clone(self))
    }
}

struct StreamGuard(Arc<StreamGauge>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    /// A mock whose GraphQL responses come from `handler`
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse, TransportFailure>
            + Send
            + Sync
            + 'static,
    {
        Self {
            endpoint: "mock://graphql".to_string(),
            handler: Box::new(handler),
            latency: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            files: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            stream_calls: AtomicUsize::new(0),
            streams: Arc::new(StreamGauge::default()),
        }
    }

    /// A mock that answers every query with the same body
    pub fn with_body(body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(move |_| Ok(TransportResponse::ok(body.clone())))
    }

    /// Delay every `send` by `latency`
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay every streamed chunk by `delay`
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Serve `chunks` for GETs of `url`
    pub fn add_file(&self, url: impl Into<String>, chunks: Vec<Bytes>) {
        let mut guard = self.files.lock().unwrap();
        guard.insert(url.into(), chunks);
    }

    /// Number of `send` calls so far
    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Every request passed to `send`, in arrival order
    pub fn requests(&self) -> Vec<TransportRequest> {
        let guard = self.sent.lock().unwrap();
        guard.iter().map(|(_, request)| request.clone()).collect()
    }

    /// Instants at which each `send` started
    pub fn dispatch_times(&self) -> Vec<Instant> {
        let guard = self.sent.lock().unwrap();
        guard.iter().map(|(at, _)| *at).collect()
    }

    /// Number of `open_stream` calls so far
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Streams currently open
    pub fn open_streams(&self) -> usize {
        self.streams.open.load(Ordering::SeqCst)
    }

    /// Highest number of streams that were open at the same time
    pub fn peak_open_streams(&self) -> usize {
        self.streams.peak.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("endpoint", &self.endpoint)
            .field("calls", &self.calls())
            .field("stream_calls", &self.stream_calls())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportFailure> {
        {
            let mut guard = self.sent.lock().unwrap();
            guard.push((Instant::now(), request.clone()));
        }

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        (self.handler)(request)
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream, TransportFailure> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        let chunks = {
            let guard = self.files.lock().unwrap();
            guard.get(url).cloned()
        };
        let Some(chunks) = chunks else {
            return Err(TransportFailure::Status {
                status: 404,
                body: format!("no such file: {}", url),
            });
        };

        let guard = self.streams.enter();
        let delay = self.chunk_delay;

        Ok(stream::iter(chunks)
            .then(move |chunk| async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                Ok::<_, TransportFailure>(chunk)
            })
            .map(move |chunk| {
                // Keeps the stream counted as open until it is dropped.
                let _open = &guard;
                chunk
            })
            .boxed())
    }
}
