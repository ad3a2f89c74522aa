//! AMQP (RabbitMQ) request queue.
//!
//! Requests are consumed from a durable request queue. The request id travels
//! in the `correlation_id` property and the format id (or a MIME type such as
//! `application/json`) in `content_type`.
//! Replies go to the request's `reply_to` queue when set, otherwise to the
//! configured response queue. A rejected request is answered with an empty
//! body and the reason in the `x-rulehost-error` header.

use async_trait::async_trait;
use backon::BackoffBuilder;
use deadpool_lapin::{Manager, Pool, PoolError};
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{MessageQueue, QueueError, QueueMessage, QueueReply, Result};
use crate::utils::retry::{reconnect_backoff, RECONNECT_MAX_DELAY};

const CONSUMER_TAG: &str = "rulehost-server";
const PREFETCH_BUFFER: usize = 64;
/// Header carrying the rejection reason of an undecodable request.
pub const ERROR_HEADER: &str = "x-rulehost-error";

/// Connection settings for the AMQP queue.
#[derive(Debug, Clone)]
pub struct AmqpQueueConfig {
    pub url: String,
    pub request_queue: String,
    pub response_queue: String,
    /// Format assumed for requests without a `content_type`.
    pub default_format: String,
}

/// Request queue backed by RabbitMQ.
pub struct AmqpQueue {
    pool: Pool,
    config: AmqpQueueConfig,
    incoming: Mutex<mpsc::Receiver<QueueMessage>>,
    consumer: JoinHandle<()>,
}

impl AmqpQueue {
    /// Connect, declare both queues, and start consuming requests.
    pub async fn connect(config: AmqpQueueConfig) -> Result<Self> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| QueueError::Connection(format!("Failed to create pool: {}", e)))?;

        let channel = get_channel(&pool).await?;
        for queue in [&config.request_queue, &config.response_queue] {
            declare(&channel, queue).await?;
        }
        info!(
            url = %config.url,
            request_queue = %config.request_queue,
            response_queue = %config.response_queue,
            "Connected to AMQP"
        );

        let (tx, rx) = mpsc::channel(PREFETCH_BUFFER);
        let consumer = tokio::spawn(consume_with_reconnect(
            pool.clone(),
            config.request_queue.clone(),
            config.default_format.clone(),
            tx,
        ));

        Ok(Self {
            pool,
            config,
            incoming: Mutex::new(rx),
            consumer,
        })
    }
}

impl Drop for AmqpQueue {
    fn drop(&mut self) {
        self.consumer.abort();
    }
}

#[async_trait]
impl MessageQueue for AmqpQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>> {
        Ok(self.incoming.lock().await.recv().await)
    }

    async fn reply(&self, request: &QueueMessage, reply: QueueReply) -> Result<()> {
        let routing_key = request
            .reply_to
            .as_deref()
            .unwrap_or(&self.config.response_queue);
        let mut properties = BasicProperties::default()
            .with_correlation_id(reply.request_id.as_str().into())
            .with_content_type(reply.format.as_str().into());
        if let Some(error) = &reply.error {
            let mut headers = FieldTable::default();
            headers.insert(
                ERROR_HEADER.into(),
                AMQPValue::LongString(error.clone().into()),
            );
            properties = properties.with_headers(headers);
        }

        let channel = get_channel(&self.pool).await?;
        let confirm = channel
            .basic_publish(
                "",
                routing_key,
                BasicPublishOptions::default(),
                &reply.body,
                properties,
            )
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;
        confirm
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        debug!(request_id = %reply.request_id, routing_key = %routing_key, "Published reply");
        Ok(())
    }
}

async fn get_channel(pool: &Pool) -> Result<Channel> {
    let conn = pool.get().await.map_err(|e: PoolError| {
        QueueError::Connection(format!("Failed to get connection from pool: {}", e))
    })?;
    conn.create_channel()
        .await
        .map_err(|e| QueueError::Connection(format!("Failed to create channel: {}", e)))
}

async fn declare(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Connection(format!("Failed to declare queue '{}': {}", queue, e)))?;
    Ok(())
}

async fn setup_consumer(pool: &Pool, queue: &str) -> Result<lapin::Consumer> {
    let channel = get_channel(pool).await?;
    declare(&channel, queue).await?;
    channel
        .basic_consume(
            queue,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| QueueError::Receive(format!("Failed to start consumer: {}", e)))
}

fn to_message(delivery: &lapin::message::Delivery, default_format: &str) -> QueueMessage {
    let properties = &delivery.properties;
    let request_id = properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let format = properties
        .content_type()
        .as_ref()
        .map(|ct| ct.as_str().to_string())
        .unwrap_or_else(|| default_format.to_string());
    QueueMessage {
        request_id,
        format,
        body: delivery.data.clone(),
        reply_to: properties
            .reply_to()
            .as_ref()
            .map(|queue| queue.as_str().to_string()),
    }
}

/// Consume requests until the listener goes away, reconnecting with
/// exponential backoff.
async fn consume_with_reconnect(
    pool: Pool,
    queue: String,
    default_format: String,
    tx: mpsc::Sender<QueueMessage>,
) {
    let backoff_builder = reconnect_backoff();
    let mut backoff = backoff_builder.build();

    loop {
        match setup_consumer(&pool, &queue).await {
            Ok(mut consumer) => {
                info!(queue = %queue, "Consumer connected, processing requests");
                backoff = backoff_builder.build();

                while let Some(delivery) = consumer.next().await {
                    let delivery = match delivery {
                        Ok(delivery) => delivery,
                        Err(e) => {
                            error!(error = %e, "Consumer delivery error, will reconnect");
                            break;
                        }
                    };
                    let message = to_message(&delivery, &default_format);
                    if let Err(e) = delivery.ack(Default::default()).await {
                        error!(error = %e, "Failed to ack request");
                    }
                    if tx.send(message).await.is_err() {
                        info!(queue = %queue, "Listener gone, stopping consumer");
                        return;
                    }
                }
                warn!(queue = %queue, "Consumer stream ended, reconnecting");
            }
            Err(e) => {
                error!(error = %e, queue = %queue, "Failed to set up consumer");
            }
        }

        let delay = backoff.next().unwrap_or(RECONNECT_MAX_DELAY);
        tokio::time::sleep(delay).await;
    }
}
