//! Message types for queue and topic operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

const MAX_RESOURCE_NAME_LEN: usize = 256;

/// Shared rules for queue and topic names.
///
/// Names are 1-256 ASCII characters made of letters, digits and hyphens and
/// must start with a letter or digit.
fn validate_resource_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_RESOURCE_NAME_LEN {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("must be 1-{} characters", MAX_RESOURCE_NAME_LEN),
        });
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "only ASCII alphanumeric characters and hyphens allowed".to_string(),
        });
    }

    if name.starts_with('-') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "must start with a letter or digit".to_string(),
        });
    }

    Ok(())
}

/// Validated queue name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_resource_name("queue_name", &name)?;
        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validated topic name.
///
/// Topics live in their own namespace; a topic and a queue may share a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    /// Create new topic name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_resource_name("topic_name", &name)?;
        Ok(Self(name))
    }

    /// Get topic name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TopicName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier assigned to a message by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.simple().to_string().to_uppercase())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp shifted forward by `offset`
    pub fn plus(&self, offset: Duration) -> Self {
        Self(self.0 + offset)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message received from a queue, still invisible to other consumers
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    /// Transport-encoded envelope text
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    /// How many times the transport has handed this message out, this one included
    pub dequeue_count: u32,
    pub enqueued_at: Timestamp,
    pub first_dequeued_at: Timestamp,
}

impl ReceivedMessage {
    /// True once the message has come back at least once after a failed attempt
    pub fn is_redelivery(&self) -> bool {
        self.dequeue_count > 1
    }
}

/// Opaque token for acknowledging a received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    expires_at: Timestamp,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String, expires_at: Timestamp) -> Self {
        Self { handle, expires_at }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Time at which the message becomes visible again
    pub fn expires_at(&self) -> &Timestamp {
        &self.expires_at
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.handle)
    }
}

/// Result of a successful topic publish as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: MessageId,
    pub status_code: u16,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
