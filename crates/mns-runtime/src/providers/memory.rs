//! In-memory transport implementation for testing and development.
//!
//! This module provides a fully functional in-memory message-queue service that:
//! - Implements long-poll receive with a bounded wait
//! - Hides received messages for a visibility timeout and redelivers them
//!   when they are not deleted in time
//! - Counts deliveries per message
//! - Fans topic publishes out to subscribed queues, honouring filter tags
//!
//! This transport is intended for:
//! - Unit and integration testing of consumers and publishers
//! - Development without access to the real service
//! - Reference behaviour for adapters of the real service

use crate::error::MnsError;
use crate::message::{
    MessageId, PublishReceipt, QueueName, ReceiptHandle, ReceivedMessage, Timestamp, TopicName,
};
use crate::transport::{QueueEndpoint, TopicEndpoint, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const PROVIDER: &str = "memory";

/// Status code reported for a successful publish
const PUBLISH_STATUS_CREATED: u16 = 201;

/// In-memory transport configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// How long a received message stays hidden before it is redelivered
    pub visibility_timeout: Duration,
    /// Largest accepted message body in bytes
    pub max_message_size: usize,
    /// Largest number of visible messages a queue holds
    pub max_queue_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_message_size: 64 * 1024,
            max_queue_size: 10_000,
        }
    }
}

/// Lock ignoring poisoning; no critical section below leaves state half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    enqueued_at: Timestamp,
    dequeue_count: u32,
    first_dequeued_at: Option<Timestamp>,
}

impl StoredMessage {
    fn new(body: String) -> Self {
        Self {
            message_id: MessageId::new(),
            body,
            enqueued_at: Timestamp::now(),
            dequeue_count: 0,
            first_dequeued_at: None,
        }
    }
}

/// A message currently hidden from receivers
struct InFlightMessage {
    message: StoredMessage,
    lock_expires_at: Instant,
}

#[derive(Default)]
struct QueueState {
    /// Visible messages in delivery order
    messages: VecDeque<StoredMessage>,
    /// Received but not yet deleted, keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl QueueState {
    /// Make messages whose visibility timeout lapsed visible again
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.lock_expires_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        let mut reclaimed: Vec<InFlightMessage> = expired
            .iter()
            .filter_map(|handle| self.in_flight.remove(handle))
            .collect();
        reclaimed.sort_by(|a, b| b.message.enqueued_at.cmp(&a.message.enqueued_at));

        // Redelivered messages go ahead of anything enqueued since
        for in_flight in reclaimed {
            self.messages.push_front(in_flight.message);
        }
    }

    fn next_lock_expiry(&self) -> Option<Instant> {
        self.in_flight.values().map(|m| m.lock_expires_at).min()
    }

    fn take_next(&mut self, now: Instant, visibility_timeout: Duration) -> Option<ReceivedMessage> {
        let mut message = self.messages.pop_front()?;
        message.dequeue_count += 1;
        let first_dequeued_at = message
            .first_dequeued_at
            .get_or_insert_with(Timestamp::now)
            .clone();

        let handle = uuid::Uuid::new_v4().to_string();
        let expires_at = Timestamp::now().plus(to_chrono(visibility_timeout));

        let received = ReceivedMessage {
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            receipt_handle: ReceiptHandle::new(handle.clone(), expires_at),
            dequeue_count: message.dequeue_count,
            enqueued_at: message.enqueued_at.clone(),
            first_dequeued_at,
        };

        self.in_flight.insert(
            handle,
            InFlightMessage {
                message,
                lock_expires_at: now + visibility_timeout,
            },
        );

        Some(received)
    }
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// A single in-memory queue, also serving as its own endpoint
pub struct InMemoryQueue {
    name: QueueName,
    state: Mutex<QueueState>,
    notify: Notify,
    config: InMemoryConfig,
}

impl InMemoryQueue {
    fn new(name: QueueName, config: InMemoryConfig) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            config,
        }
    }

    fn enqueue(&self, body: String) -> Result<MessageId, MnsError> {
        if body.len() > self.config.max_message_size {
            return Err(MnsError::MessageTooLarge {
                size: body.len(),
                max_size: self.config.max_message_size,
            });
        }

        let message = StoredMessage::new(body);
        let message_id = message.message_id.clone();
        {
            let mut state = lock(&self.state);
            if self.is_full(&state) {
                return Err(self.full_error());
            }
            state.messages.push_back(message);
        }
        self.notify.notify_one();

        Ok(message_id)
    }

    fn is_full(&self, state: &QueueState) -> bool {
        state.messages.len() >= self.config.max_queue_size
    }

    fn full_error(&self) -> MnsError {
        MnsError::provider(
            PROVIDER,
            "QueueFull",
            format!(
                "queue '{}' holds {} messages",
                self.name, self.config.max_queue_size
            ),
        )
    }

    fn pending_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.reclaim_expired(Instant::now());
        state.messages.len()
    }

    fn in_flight_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.reclaim_expired(Instant::now());
        state.in_flight.len()
    }
}

#[async_trait]
impl QueueEndpoint for InMemoryQueue {
    fn queue_name(&self) -> &QueueName {
        &self.name
    }

    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, MnsError> {
        let deadline = Instant::now() + wait;

        loop {
            let wakeup = {
                let mut state = lock(&self.state);
                let now = Instant::now();
                state.reclaim_expired(now);
                if let Some(received) = state.take_next(now, self.config.visibility_timeout) {
                    return Ok(Some(received));
                }
                state
                    .next_lock_expiry()
                    .map_or(deadline, |expiry| expiry.min(deadline))
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Woken by a send, a lapsed visibility timeout or the deadline
            let _ = tokio::time::timeout_at(wakeup, self.notify.notified()).await;
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), MnsError> {
        let mut state = lock(&self.state);
        state.reclaim_expired(Instant::now());

        match state.in_flight.remove(receipt.handle()) {
            Some(_) => Ok(()),
            None => Err(MnsError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            }),
        }
    }
}

// ============================================================================
// InMemoryTopic
// ============================================================================

/// Topic-to-queue routing rule
#[derive(Debug, Clone)]
struct Subscription {
    queue: QueueName,
    filter_tag: Option<String>,
}

impl Subscription {
    fn accepts(&self, tag: &str) -> bool {
        match &self.filter_tag {
            Some(filter) => filter == tag,
            None => true,
        }
    }
}

/// A message accepted by a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub message_id: MessageId,
    pub body: String,
    pub filter_tag: String,
}

/// Endpoint for a single in-memory topic
pub struct InMemoryTopic {
    name: TopicName,
    shared: Arc<Shared>,
}

#[async_trait]
impl TopicEndpoint for InMemoryTopic {
    fn topic_name(&self) -> &TopicName {
        &self.name
    }

    async fn publish(&self, body: String, filter_tag: &str) -> Result<PublishReceipt, MnsError> {
        let max_size = self.shared.config.max_message_size;
        if body.len() > max_size {
            return Err(MnsError::MessageTooLarge {
                size: body.len(),
                max_size,
            });
        }

        let mut targets: Vec<QueueName> = lock(&self.shared.subscriptions)
            .get(&self.name)
            .map(|subs| {
                subs.iter()
                    .filter(|sub| sub.accepts(filter_tag))
                    .map(|sub| sub.queue.clone())
                    .collect()
            })
            .unwrap_or_default();

        // Fixed lock order, one lock per queue
        targets.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        targets.dedup();

        // Either every subscribed queue receives the message or none does
        let queues: Vec<Arc<InMemoryQueue>> =
            targets.iter().map(|name| self.shared.queue(name)).collect();
        {
            let mut states: Vec<MutexGuard<'_, QueueState>> =
                queues.iter().map(|queue| lock(&queue.state)).collect();

            if let Some(full) = queues
                .iter()
                .zip(&states)
                .find(|(queue, state)| queue.is_full(state))
            {
                return Err(full.0.full_error());
            }

            for state in states.iter_mut() {
                state.messages.push_back(StoredMessage::new(body.clone()));
            }
        }
        for queue in &queues {
            queue.notify.notify_one();
        }

        let message_id = MessageId::new();
        lock(&self.shared.published)
            .entry(self.name.clone())
            .or_default()
            .push(PublishedMessage {
                message_id: message_id.clone(),
                body,
                filter_tag: filter_tag.to_string(),
            });

        Ok(PublishReceipt {
            message_id,
            status_code: PUBLISH_STATUS_CREATED,
        })
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

struct Shared {
    queues: Mutex<HashMap<QueueName, Arc<InMemoryQueue>>>,
    subscriptions: Mutex<HashMap<TopicName, Vec<Subscription>>>,
    published: Mutex<HashMap<TopicName, Vec<PublishedMessage>>>,
    config: InMemoryConfig,
}

impl Shared {
    /// Get or create a queue
    fn queue(&self, name: &QueueName) -> Arc<InMemoryQueue> {
        lock(&self.queues)
            .entry(name.clone())
            .or_insert_with(|| Arc::new(InMemoryQueue::new(name.clone(), self.config.clone())))
            .clone()
    }
}

/// In-memory message-queue service
#[derive(Clone)]
pub struct InMemoryTransport {
    shared: Arc<Shared>,
}

impl InMemoryTransport {
    /// Create new in-memory transport with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                published: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Route messages published to `topic` into `queue`.
    ///
    /// With a filter tag only messages published under that exact tag are
    /// routed.
    pub fn subscribe(&self, topic: &TopicName, queue: &QueueName, filter_tag: Option<&str>) {
        lock(&self.shared.subscriptions)
            .entry(topic.clone())
            .or_default()
            .push(Subscription {
                queue: queue.clone(),
                filter_tag: filter_tag.map(str::to_string),
            });
    }

    /// Put a raw body straight onto a queue
    pub fn send_raw(
        &self,
        queue: &QueueName,
        body: impl Into<String>,
    ) -> Result<MessageId, MnsError> {
        self.shared.queue(queue).enqueue(body.into())
    }

    /// Visible messages waiting in `queue`
    pub fn pending_count(&self, queue: &QueueName) -> usize {
        self.shared.queue(queue).pending_count()
    }

    /// Received but not yet deleted messages in `queue`
    pub fn in_flight_count(&self, queue: &QueueName) -> usize {
        self.shared.queue(queue).in_flight_count()
    }

    /// Everything published to `topic` so far, oldest first
    pub fn published(&self, topic: &TopicName) -> Vec<PublishedMessage> {
        lock(&self.shared.published)
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl Transport for InMemoryTransport {
    fn queue(&self, name: &QueueName) -> Arc<dyn QueueEndpoint> {
        self.shared.queue(name)
    }

    fn topic(&self, name: &TopicName) -> Arc<dyn TopicEndpoint> {
        Arc::new(InMemoryTopic {
            name: name.clone(),
            shared: Arc::clone(&self.shared),
        })
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
