//! Queue adapter.
//!
//! A request message carries a request id, a format and a marshalled command
//! script. The listener answers every request with exactly one reply
//! correlated by the same request id. A request whose envelope cannot be
//! decoded gets a reply with an empty body and `error` set. Redelivery belongs
//! to the queue; the listener never retries.

#[cfg(feature = "amqp")]
pub mod amqp;
#[cfg(feature = "channel")]
pub mod channel;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpQueue, AmqpQueueConfig};
#[cfg(feature = "channel")]
pub use channel::{channel_queue, ChannelClient, ChannelQueue, PendingReply};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use super::handle_script;
use crate::engine::ExecutionEngine;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by a message queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Queue closed")]
    Closed,
}

/// Inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Correlates the reply with this request.
    pub request_id: String,
    /// Format id or content type of `body`.
    pub format: String,
    pub body: Vec<u8>,
    /// Destination for the reply when the queue supports per-request routing.
    pub reply_to: Option<String>,
}

/// Outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueReply {
    pub request_id: String,
    pub format: String,
    /// Marshalled `ServiceResponsesList`; empty when `error` is set.
    pub body: Vec<u8>,
    /// Why the request envelope was rejected, as `[<Kind>] <detail>`.
    pub error: Option<String>,
}

impl QueueReply {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Request/reply message queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Next request, or `None` once the queue is closed.
    async fn receive(&self) -> Result<Option<QueueMessage>>;

    /// Publish the reply to `request`.
    async fn reply(&self, request: &QueueMessage, reply: QueueReply) -> Result<()>;
}

/// Feeds queue requests to the execution engine.
pub struct QueueListener {
    engine: Arc<ExecutionEngine>,
    queue: Arc<dyn MessageQueue>,
}

impl QueueListener {
    pub fn new(engine: Arc<ExecutionEngine>, queue: Arc<dyn MessageQueue>) -> Self {
        Self { engine, queue }
    }

    /// Run until the queue closes. Each request is handled on its own task.
    pub async fn run(self) -> Result<()> {
        info!("Queue listener started");
        while let Some(message) = self.queue.receive().await? {
            let engine = self.engine.clone();
            let queue = self.queue.clone();
            let span = tracing::info_span!("queue.request", request_id = %message.request_id, format = %message.format);
            tokio::spawn(
                async move {
                    Self::handle(&engine, queue.as_ref(), message).await;
                }
                .instrument(span),
            );
        }
        info!("Queue closed, listener stopping");
        Ok(())
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn handle(engine: &ExecutionEngine, queue: &dyn MessageQueue, message: QueueMessage) {
        debug!(bytes = message.body.len(), "Received request");
        let (body, error) = match handle_script(engine, &message.format, &message.body).await {
            Ok(body) => (body, None),
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "Rejected undecodable request");
                (Vec::new(), Some(format!("[{}] {}", e.kind(), e)))
            }
        };

        let reply = QueueReply {
            request_id: message.request_id.clone(),
            format: message.format.clone(),
            body,
            error,
        };
        if let Err(e) = queue.reply(&message, reply).await {
            error!(error = %e, "Failed to publish reply");
        }
    }
}
