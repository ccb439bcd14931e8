//! Queue and topic registries.
//!
//! Queues are registered explicitly and keyed by name; registering a name a
//! second time replaces the earlier entry. Topics are created on first use
//! and cached for the lifetime of the client.

use crate::handler::QueueHandler;
use crate::message::{QueueName, TopicName};
use crate::transport::{QueueEndpoint, TopicEndpoint, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// Wait window used when a queue is registered with a wait of zero seconds
pub const DEFAULT_WAIT_SECONDS: u64 = 30;

// ============================================================================
// Queues
// ============================================================================

/// A registered queue: its name, its handler and its long-poll window.
///
/// Queues without a handler are declared for lookup only and are never
/// polled.
#[derive(Clone)]
pub struct Queue {
    name: QueueName,
    handler: Option<Arc<dyn QueueHandler>>,
    wait_seconds: u64,
    endpoint: Arc<dyn QueueEndpoint>,
}

impl Queue {
    /// Create a queue bound to a transport endpoint
    pub fn new(
        name: QueueName,
        handler: Option<Arc<dyn QueueHandler>>,
        wait_seconds: u64,
        endpoint: Arc<dyn QueueEndpoint>,
    ) -> Self {
        Self {
            name,
            handler,
            wait_seconds,
            endpoint,
        }
    }

    /// Queue name
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Wait window as registered, zero meaning "use the default"
    pub fn wait_seconds(&self) -> u64 {
        self.wait_seconds
    }

    /// Long-poll window used for each receive
    pub fn wait_time(&self) -> Duration {
        match self.wait_seconds {
            0 => Duration::from_secs(DEFAULT_WAIT_SECONDS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Whether a consumer should be started for this queue
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn handler(&self) -> Option<&Arc<dyn QueueHandler>> {
        self.handler.as_ref()
    }

    pub fn endpoint(&self) -> &Arc<dyn QueueEndpoint> {
        &self.endpoint
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("wait_seconds", &self.wait_seconds)
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Queues registered with a client, keyed by name
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: HashMap<QueueName, Arc<Queue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue, returning the entry it replaced if the name was
    /// already taken
    pub fn insert(&mut self, queue: Queue) -> Option<Arc<Queue>> {
        self.queues.insert(queue.name.clone(), Arc::new(queue))
    }

    pub fn get(&self, name: &QueueName) -> Option<Arc<Queue>> {
        self.queues.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queues that have a handler and should be consumed
    pub fn consumable(&self) -> impl Iterator<Item = &Arc<Queue>> {
        self.queues.values().filter(|queue| queue.has_handler())
    }
}

// ============================================================================
// Topics
// ============================================================================

/// A topic bound to a transport endpoint
pub struct Topic {
    name: TopicName,
    endpoint: Arc<dyn TopicEndpoint>,
}

impl Topic {
    pub fn new(name: TopicName, endpoint: Arc<dyn TopicEndpoint>) -> Self {
        Self { name, endpoint }
    }

    pub fn name(&self) -> &TopicName {
        &self.name
    }

    pub fn endpoint(&self) -> &Arc<dyn TopicEndpoint> {
        &self.endpoint
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic").field("name", &self.name).finish()
    }
}

/// Lazily populated cache of topic handles.
///
/// Concurrent first lookups of the same name observe a single [`Topic`].
pub struct TopicRegistry {
    transport: Arc<dyn Transport>,
    topics: RwLock<HashMap<TopicName, Arc<Topic>>>,
}

impl TopicRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached topic, binding a new endpoint on first use
    pub async fn get_or_create(&self, name: &TopicName) -> Arc<Topic> {
        {
            let topics = self.topics.read().await;
            if let Some(topic) = topics.get(name) {
                return Arc::clone(topic);
            }
        }

        let mut topics = self.topics.write().await;
        let topic = topics.entry(name.clone()).or_insert_with(|| {
            tracing::debug!(
                topic_name = %name,
                transport = self.transport.name(),
                "Binding topic endpoint"
            );
            Arc::new(Topic::new(name.clone(), self.transport.topic(name)))
        });

        Arc::clone(topic)
    }

    /// Cached topic, if it has been used before
    pub async fn get(&self, name: &TopicName) -> Option<Arc<Topic>> {
        self.topics.read().await.get(name).cloned()
    }

    /// Number of topics bound so far
    pub async fn count(&self) -> usize {
        self.topics.read().await.len()
    }
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("transport", &self.transport.name())
            .finish()
    }
}
