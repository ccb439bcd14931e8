//! Transport adapter traits.
//!
//! The message-queue service itself is an external collaborator. An adapter
//! for it implements [`Transport`], which hands out per-queue and per-topic
//! endpoints. The client binds an endpoint to each queue when it is
//! registered and to each topic the first time something is published to it.
//!
//! The crate ships [`InMemoryTransport`](crate::providers::InMemoryTransport)
//! as the reference implementation of these contracts.

use crate::error::MnsError;
use crate::message::{PublishReceipt, QueueName, ReceiptHandle, ReceivedMessage, TopicName};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Factory for queue and topic endpoints of one message-queue service
pub trait Transport: Send + Sync {
    /// Bind an endpoint for the named queue
    fn queue(&self, name: &QueueName) -> Arc<dyn QueueEndpoint>;

    /// Bind an endpoint for the named topic
    fn topic(&self, name: &TopicName) -> Arc<dyn TopicEndpoint>;

    /// Human-readable adapter name for logging
    fn name(&self) -> &'static str;
}

/// Receive and delete operations against a single queue
#[async_trait]
pub trait QueueEndpoint: Send + Sync {
    /// Queue this endpoint is bound to
    fn queue_name(&self) -> &QueueName;

    /// Long-poll for the next message.
    ///
    /// Waits up to `wait` for a message to become visible. Returns `Ok(None)`
    /// when the window elapses with nothing to deliver. A returned message
    /// stays invisible to other receivers until it is deleted or its
    /// visibility timeout lapses.
    async fn receive(&self, wait: Duration) -> Result<Option<ReceivedMessage>, MnsError>;

    /// Acknowledge a message by deleting it
    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), MnsError>;
}

/// Publish operation against a single topic
#[async_trait]
pub trait TopicEndpoint: Send + Sync {
    /// Topic this endpoint is bound to
    fn topic_name(&self) -> &TopicName;

    /// Publish a text body with a filter tag (empty for none)
    async fn publish(&self, body: String, filter_tag: &str) -> Result<PublishReceipt, MnsError>;
}
