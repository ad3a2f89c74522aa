//! rulehost-server: command-execution server
//!
//! Hosts rule containers and serves command scripts over REST and, when
//! messaging is configured, over a request queue.
//!
//! ## Architecture
//! ```text
//! [REST client] ----\
//!                    +--> [ExecutionEngine] -> [ContainerRegistry] -> [Release repository]
//! [Request queue] --/            |
//!                                v
//!                        [Sessions / rule engines]
//! ```
//!
//! ## Configuration
//! - `--config <path>` or RULEHOST_CONFIG: YAML configuration file
//! - RULEHOST__SERVER__PORT, RULEHOST__EXECUTION__DEFAULT_FORMAT, ...: overrides
//! - RULEHOST_LOG: tracing filter (default `info`)

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use rulehost::config::{engine_options, Config, MessagingConfig, MessagingType};
use rulehost::engine::ExecutionEngine;
use rulehost::marshal::MarshallerRegistry;
use rulehost::registry::ContainerRegistry;
use rulehost::transport::queue::{self, MessageQueue, QueueListener};
use rulehost::transport::rest;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    rulehost::utils::bootstrap::init_tracing();

    let config_path = rulehost::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting rulehost-server");

    let resolver = config.repository.build()?;
    let registry = ContainerRegistry::new(resolver, config.execution.resolve_timeout());
    let marshallers = Arc::new(MarshallerRegistry::with_defaults());
    let options = engine_options(&config.server, &config.execution);
    let engine = Arc::new(ExecutionEngine::new(registry.clone(), marshallers, options));

    for container in &config.containers {
        let command = container.to_command()?;
        match registry
            .create(&command.container_id, command.release_id, command.config)
            .await
        {
            Ok(resource) => info!(
                container_id = %resource.container_id,
                release_id = %resource.release_id,
                "Startup container created"
            ),
            Err(e) => error!(container_id = %container.id, error = %e, "Failed to create startup container"),
        }
    }

    let listener = match &config.messaging {
        Some(messaging) => start_queue(&engine, messaging).await?,
        None => {
            info!("No messaging configured, serving REST only");
            None
        }
    };

    let served = rest::serve(engine, &config.server.host, config.server.port).await;
    if let Some(listener) = listener {
        listener.abort();
    }
    served
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Start the queue listener for the configured broker.
///
/// The channel queue only accepts producers inside this process, so no
/// listener is started for it.
async fn start_queue(
    engine: &Arc<ExecutionEngine>,
    messaging: &MessagingConfig,
) -> Result<Option<JoinHandle<queue::Result<()>>>, BoxError> {
    let queue: Arc<dyn MessageQueue> = match messaging.messaging_type {
        #[cfg(feature = "amqp")]
        MessagingType::Amqp => {
            info!("Using AMQP request queue: {}", messaging.amqp.url);
            Arc::new(
                queue::AmqpQueue::connect(queue::AmqpQueueConfig {
                    url: messaging.amqp.url.clone(),
                    request_queue: messaging.amqp.request_queue.clone(),
                    response_queue: messaging.amqp.response_queue.clone(),
                    default_format: engine.default_format().to_string(),
                })
                .await?,
            )
        }
        #[cfg(not(feature = "amqp"))]
        MessagingType::Amqp => {
            return Err("AMQP messaging requires the 'amqp' feature".into());
        }
        MessagingType::Channel => {
            warn!("Channel messaging has no external producers, queue listener not started");
            return Ok(None);
        }
    };

    Ok(Some(QueueListener::new(engine.clone(), queue).spawn()))
}
