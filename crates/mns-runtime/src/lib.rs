//! # MNS Runtime
//!
//! Message-queue client with signed envelopes, long-poll consumers and topic
//! publishing.
//!
//! This library provides:
//! - The [`Envelope`] payload and its Base64-of-JSON wire codec
//! - Deterministic envelope signing with a shared secret
//! - Named queues bound to handlers, consumed by one long-poll loop each
//! - At-least-once delivery: messages are deleted only after their handler succeeds
//! - Topic publishing with automatic trace id and signature
//! - Trace-id propagation from consumed messages to messages published while
//!   handling them
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all client operations
//! - [`message`] - Names, identifiers and received-message structures
//! - [`envelope`] - The envelope and its codec
//! - [`signer`] - Secret handling and signatures
//! - [`trace`] - Task-scoped trace ids
//! - [`transport`] - Traits implemented by message-queue service adapters
//! - [`providers`] - Bundled transport implementations
//! - [`registry`] - Queue and topic registries
//! - [`handler`] - The queue handler trait
//! - [`consumer`] - The consumption engine
//! - [`publisher`] - Topic publishing
//! - [`client`] - The client entry point
//! - [`config`] - Layered configuration loading

// Module declarations
pub mod client;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod message;
pub mod providers;
pub mod publisher;
pub mod registry;
pub mod signer;
pub mod trace;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use client::MnsClient;
pub use config::MnsConfig;
pub use consumer::{
    spawn_consumers, ListenerHandle, PollOutcome, QueueConsumer, MIN_RETRY_PAUSE, RECEIVE_GRACE,
};
pub use envelope::Envelope;
pub use error::{ConfigurationError, MnsError, SerializationError, ValidationError};
pub use handler::QueueHandler;
pub use message::{
    MessageId, PublishReceipt, QueueName, ReceiptHandle, ReceivedMessage, Timestamp, TopicName,
};
pub use providers::{InMemoryConfig, InMemoryTransport, PublishedMessage};
pub use publisher::Publisher;
pub use registry::{Queue, QueueRegistry, Topic, TopicRegistry, DEFAULT_WAIT_SECONDS};
pub use signer::{SharedSecret, Signer};
pub use transport::{QueueEndpoint, TopicEndpoint, Transport};
