//! The client entry point.

use crate::config::MnsConfig;
use crate::consumer::{spawn_consumers, ListenerHandle};
use crate::envelope::Envelope;
use crate::error::MnsError;
use crate::handler::QueueHandler;
use crate::message::{PublishReceipt, QueueName, TopicName};
use crate::publisher::Publisher;
use crate::registry::{Queue, QueueRegistry};
use crate::signer::{SharedSecret, Signer};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Message-queue client.
///
/// Owns the signing secret, the registered queues and the topic cache. A
/// typical service registers its queues, starts the consumers once, and
/// publishes from request handlers or from other queue handlers:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mns_runtime::{Envelope, InMemoryTransport, MnsClient, SharedSecret};
///
/// # async fn run() -> Result<(), mns_runtime::MnsError> {
/// let transport = Arc::new(InMemoryTransport::default());
/// let client = MnsClient::new(transport, SharedSecret::new("secret"));
///
/// client
///     .add_queue("orders", |envelope: Envelope| async move {
///         println!("order: {}", envelope.content);
///         anyhow::Ok(())
///     }, 5)
///     .await?;
///
/// let listener = client.listen_queues().await;
/// client.publish_message("alerts", Envelope::new("hi"), "urgent").await?;
/// listener.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct MnsClient {
    signer: Arc<Signer>,
    transport: Arc<dyn Transport>,
    queues: RwLock<QueueRegistry>,
    publisher: Publisher,
}

impl MnsClient {
    /// Create a client over `transport`, signing with `secret`
    pub fn new(transport: Arc<dyn Transport>, secret: SharedSecret) -> Self {
        let signer = Arc::new(Signer::new(secret));
        Self {
            publisher: Publisher::new(Arc::clone(&signer), Arc::clone(&transport)),
            signer,
            transport,
            queues: RwLock::new(QueueRegistry::new()),
        }
    }

    /// Create a client from validated configuration
    pub fn from_config(
        config: &MnsConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, MnsError> {
        config.validate()?;
        Ok(Self::new(transport, config.access_key_secret.clone()))
    }

    /// Signature of `payload` under the client's secret
    pub fn generate_sign(&self, payload: &str) -> String {
        self.signer.sign(payload)
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Register a queue to be consumed by `handler`.
    ///
    /// `wait_seconds` is the long-poll window for each receive; zero selects
    /// the default. Registering a name again replaces the earlier handler.
    /// Consumers already started by [`listen_queues`](Self::listen_queues)
    /// keep the handler they were started with.
    pub async fn add_queue<H>(
        &self,
        name: &str,
        handler: H,
        wait_seconds: u64,
    ) -> Result<(), MnsError>
    where
        H: QueueHandler + 'static,
    {
        let handler: Arc<dyn QueueHandler> = Arc::new(handler);
        self.register(name, Some(handler), wait_seconds).await
    }

    /// Register a queue for lookup only; it is never polled
    pub async fn declare_queue(&self, name: &str, wait_seconds: u64) -> Result<(), MnsError> {
        self.register(name, None, wait_seconds).await
    }

    async fn register(
        &self,
        name: &str,
        handler: Option<Arc<dyn QueueHandler>>,
        wait_seconds: u64,
    ) -> Result<(), MnsError> {
        let name = QueueName::new(name)?;
        let endpoint = self.transport.queue(&name);
        let has_handler = handler.is_some();
        let queue = Queue::new(name.clone(), handler, wait_seconds, endpoint);

        let replaced = self.queues.write().await.insert(queue);

        debug!(
            queue_name = %name,
            wait_seconds,
            has_handler,
            replaced = replaced.is_some(),
            "Registered queue"
        );

        Ok(())
    }

    /// Registered queue by name
    pub async fn get_queue(&self, name: &str) -> Option<Arc<Queue>> {
        let name = QueueName::new(name).ok()?;
        self.queues.read().await.get(&name)
    }

    /// Start one consumer per registered queue with a handler.
    ///
    /// Returns immediately; the consumers run on the Tokio runtime until the
    /// returned handle is shut down.
    pub async fn listen_queues(&self) -> ListenerHandle {
        let queues: Vec<Arc<Queue>> = self.queues.read().await.consumable().cloned().collect();

        let listener = spawn_consumers(queues);
        info!(
            queue_count = listener.len(),
            transport = self.transport.name(),
            "Listening on queues"
        );

        listener
    }

    /// Publish `envelope` to the named topic.
    ///
    /// Fills in a missing trace id and signature before sending.
    pub async fn publish_message(
        &self,
        topic_name: &str,
        envelope: Envelope,
        filter_tag: &str,
    ) -> Result<PublishReceipt, MnsError> {
        let topic_name = TopicName::new(topic_name)?;
        self.publisher
            .publish(&topic_name, envelope, filter_tag)
            .await
    }
}

impl std::fmt::Debug for MnsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnsClient")
            .field("transport", &self.transport.name())
            .field("signer", &self.signer)
            .finish()
    }
}
