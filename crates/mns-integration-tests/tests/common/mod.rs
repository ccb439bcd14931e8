//! Common test utilities for mns-runtime integration tests
//!
//! This module provides:
//! - A client wired to an in-memory transport
//! - A recording handler that can be told to fail
//! - Polling helpers for asynchronous assertions

use async_trait::async_trait;
use mns_runtime::{
    Envelope, InMemoryConfig, InMemoryTransport, MnsClient, QueueHandler, QueueName,
    SharedSecret, TopicName,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SECRET: &str = "integration-secret";

/// Client and the transport behind it, with the given visibility timeout
pub fn setup(visibility_timeout: Duration) -> (InMemoryTransport, Arc<MnsClient>) {
    let transport = InMemoryTransport::new(InMemoryConfig {
        visibility_timeout,
        ..InMemoryConfig::default()
    });
    let client = MnsClient::new(Arc::new(transport.clone()), SharedSecret::new(SECRET));
    (transport, Arc::new(client))
}

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

#[allow(dead_code)]
pub fn topic(name: &str) -> TopicName {
    TopicName::new(name).unwrap()
}

/// Poll `condition` every 50ms until it holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler recording every envelope it sees, failing the first N calls
#[derive(Clone, Default)]
pub struct RecordingHandler {
    envelopes: Arc<Mutex<Vec<Envelope>>>,
    failures_remaining: Arc<AtomicU32>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn failing_first(failures: u32) -> Self {
        let handler = Self::default();
        handler.failures_remaining.store(failures, Ordering::SeqCst);
        handler
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.envelopes.lock().unwrap().len()
    }
}

#[async_trait]
impl QueueHandler for RecordingHandler {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.envelopes.lock().unwrap().push(envelope);

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("simulated handler failure");
        }

        Ok(())
    }
}
