//! Transport implementations.
//!
//! This module contains concrete implementations of the `Transport`,
//! `QueueEndpoint` and `TopicEndpoint` traits.

pub mod memory;

pub use memory::{InMemoryConfig, InMemoryQueue, InMemoryTopic, InMemoryTransport, PublishedMessage};
