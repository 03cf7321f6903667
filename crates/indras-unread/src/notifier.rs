//! Outbound notifications to the server
//!
//! The engine mutates the unread store optimistically and then queues a
//! request here. Requests are best-effort: a failed post is logged and
//! dropped, never retried, and the resulting discrepancy is left for the
//! next full resynchronization to fix.
//!
//! ## Example
//!
//! ```rust,ignore
//! let (notifier, queue) = OutboundNotifier::channel();
//! let dispatcher = OutboundDispatcher::new(queue, Arc::new(HttpTransport::new(url)));
//! let handle = dispatcher.spawn();
//!
//! notifier.send(ServerRequest::mark_read(vec![MessageId(1), MessageId(2)]));
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::message::{MessageId, StreamId};

/// A request for the remote server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerRequest {
    /// Add the read flag to these messages
    MarkRead { messages: Vec<MessageId> },
    /// Remove the read flag from these messages
    MarkUnread { messages: Vec<MessageId> },
    /// Mark every message read
    MarkAllRead,
    /// Mark every message in a stream read
    MarkStreamRead { stream_id: StreamId },
    /// Mark every message in a topic read
    MarkTopicRead { stream_id: StreamId, topic: String },
}

impl ServerRequest {
    pub fn mark_read(messages: Vec<MessageId>) -> Self {
        Self::MarkRead { messages }
    }

    pub fn mark_unread(messages: Vec<MessageId>) -> Self {
        Self::MarkUnread { messages }
    }

    /// REST endpoint for this request
    pub fn path(&self) -> &'static str {
        match self {
            Self::MarkRead { .. } | Self::MarkUnread { .. } => "/json/messages/flags",
            Self::MarkAllRead => "/json/mark_all_as_read",
            Self::MarkStreamRead { .. } => "/json/mark_stream_as_read",
            Self::MarkTopicRead { .. } => "/json/mark_topic_as_read",
        }
    }

    /// Message ids carried by flag requests
    pub fn message_ids(&self) -> &[MessageId] {
        match self {
            Self::MarkRead { messages } | Self::MarkUnread { messages } => messages,
            _ => &[],
        }
    }
}

/// Callback run after the server accepted a request
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// A queued request and its optional success continuation
pub struct OutboundCall {
    pub request: ServerRequest,
    pub on_success: Option<Continuation>,
}

impl fmt::Debug for OutboundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundCall")
            .field("request", &self.request)
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

/// Transport boundary to the remote server
#[async_trait]
pub trait ServerTransport: Send + Sync {
    async fn post(&self, request: &ServerRequest) -> Result<(), TransportError>;
}

/// Sending half: queues requests without blocking
#[derive(Debug, Clone)]
pub struct OutboundNotifier {
    tx: mpsc::UnboundedSender<OutboundCall>,
}

impl OutboundNotifier {
    /// Create a notifier and the queue its requests land in
    pub fn channel() -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, OutboundQueue { rx })
    }

    /// Queue a request with no continuation
    pub fn send(&self, request: ServerRequest) {
        self.enqueue(OutboundCall {
            request,
            on_success: None,
        });
    }

    /// Queue a request that runs `on_success` once the server accepts it
    pub fn send_with(&self, request: ServerRequest, on_success: impl FnOnce() + Send + 'static) {
        self.enqueue(OutboundCall {
            request,
            on_success: Some(Box::new(on_success)),
        });
    }

    fn enqueue(&self, call: OutboundCall) {
        debug!(
            path = call.request.path(),
            ids = call.request.message_ids().len(),
            "Queueing server request"
        );
        if let Err(e) = self.tx.send(call) {
            warn!(request = ?e.0.request, "Outbound queue closed, dropping request");
        }
    }
}

/// Receiving half of the outbound queue
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<OutboundCall>,
}

impl OutboundQueue {
    /// Take everything queued so far without waiting
    pub fn try_drain(&mut self) -> Vec<OutboundCall> {
        let mut calls = Vec::new();
        while let Ok(call) = self.rx.try_recv() {
            calls.push(call);
        }
        calls
    }

    /// Wait for the next call; `None` once every notifier is dropped
    pub async fn recv(&mut self) -> Option<OutboundCall> {
        self.rx.recv().await
    }
}

/// Counters reported by a dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: usize,
    pub failed: usize,
}

/// Drains the outbound queue through a transport
pub struct OutboundDispatcher<T: ServerTransport> {
    queue: OutboundQueue,
    transport: Arc<T>,
    stats: DispatchStats,
}

impl<T: ServerTransport + 'static> OutboundDispatcher<T> {
    pub fn new(queue: OutboundQueue, transport: Arc<T>) -> Self {
        Self {
            queue,
            transport,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Post calls until every notifier has been dropped
    pub async fn run(mut self) -> DispatchStats {
        while let Some(call) = self.queue.recv().await {
            self.dispatch(call).await;
        }
        debug!(sent = self.stats.sent, failed = self.stats.failed, "Outbound dispatcher exited");
        self.stats
    }

    /// Run the dispatcher on the tokio runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<DispatchStats> {
        tokio::spawn(self.run())
    }

    /// Post whatever is queued right now, returning how many calls ran
    pub async fn flush(&mut self) -> usize {
        let calls = self.queue.try_drain();
        let count = calls.len();
        for call in calls {
            self.dispatch(call).await;
        }
        count
    }

    async fn dispatch(&mut self, call: OutboundCall) {
        match self.transport.post(&call.request).await {
            Ok(()) => {
                self.stats.sent += 1;
                if let Some(on_success) = call.on_success {
                    on_success();
                }
            }
            Err(e) => {
                // Not retried; the next full resync reconciles
                self.stats.failed += 1;
                warn!(path = call.request.path(), error = %e, "Server request failed");
            }
        }
    }
}
