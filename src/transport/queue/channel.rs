//! In-process request queue over tokio channels.
//!
//! Used for standalone deployments and tests; no external broker. Each
//! request registers a oneshot waiter keyed by its request id, and the queue
//! routes the reply straight to it. Dropping a [`PendingReply`] evicts its
//! waiter, so a caller that gives up leaves nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{MessageQueue, QueueError, QueueMessage, QueueReply, Result};

type Waiters = Arc<Mutex<HashMap<String, oneshot::Sender<QueueReply>>>>;

fn lock(waiters: &Waiters) -> MutexGuard<'_, HashMap<String, oneshot::Sender<QueueReply>>> {
    waiters.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server side of a channel queue.
pub struct ChannelQueue {
    requests: tokio::sync::Mutex<mpsc::Receiver<QueueMessage>>,
    waiters: Waiters,
}

/// Client side of a channel queue.
pub struct ChannelClient {
    requests: mpsc::Sender<QueueMessage>,
    waiters: Waiters,
}

/// A sent request awaiting its reply.
pub struct PendingReply {
    request_id: String,
    reply: oneshot::Receiver<QueueReply>,
    waiters: Waiters,
}

/// Create a connected queue and client with `capacity` buffered requests.
pub fn channel_queue(capacity: usize) -> (ChannelQueue, ChannelClient) {
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let waiters = Waiters::default();
    (
        ChannelQueue {
            requests: tokio::sync::Mutex::new(request_rx),
            waiters: waiters.clone(),
        },
        ChannelClient {
            requests: request_tx,
            waiters,
        },
    )
}

#[async_trait]
impl MessageQueue for ChannelQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>> {
        Ok(self.requests.lock().await.recv().await)
    }

    async fn reply(&self, _request: &QueueMessage, reply: QueueReply) -> Result<()> {
        let waiter = lock(&self.waiters).remove(&reply.request_id);
        match waiter {
            Some(waiter) => {
                if waiter.send(reply).is_err() {
                    debug!("Caller went away before the reply arrived");
                }
            }
            None => debug!(request_id = %reply.request_id, "No caller waiting, reply dropped"),
        }
        Ok(())
    }
}

impl Drop for ChannelQueue {
    fn drop(&mut self) {
        // Fails every outstanding wait with `Closed`.
        lock(&self.waiters).clear();
    }
}

impl ChannelClient {
    /// Enqueue a request.
    pub async fn send(&self, format: &str, body: impl Into<Vec<u8>>) -> Result<PendingReply> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.waiters).insert(request_id.clone(), tx);
        let pending = PendingReply {
            request_id: request_id.clone(),
            reply: rx,
            waiters: self.waiters.clone(),
        };

        let message = QueueMessage {
            request_id: request_id.clone(),
            format: format.to_string(),
            body: body.into(),
            reply_to: None,
        };
        self.requests
            .send(message)
            .await
            .map_err(|_| QueueError::Closed)?;
        debug!(request_id = %request_id, "Request enqueued");
        Ok(pending)
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, format: &str, body: impl Into<Vec<u8>>) -> Result<QueueReply> {
        self.send(format, body).await?.wait().await
    }

    /// Number of requests still waiting for a reply.
    pub fn pending(&self) -> usize {
        lock(&self.waiters).len()
    }

    /// Close the request side; the listener stops once drained.
    pub fn close(self) {
        drop(self.requests);
    }
}

impl PendingReply {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the correlated reply.
    pub async fn wait(mut self) -> Result<QueueReply> {
        (&mut self.reply).await.map_err(|_| QueueError::Closed)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        lock(&self.waiters).remove(&self.request_id);
    }
}
