//! Topic publishing.

use crate::envelope::Envelope;
use crate::error::MnsError;
use crate::message::{PublishReceipt, Timestamp, TopicName};
use crate::registry::TopicRegistry;
use crate::signer::Signer;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;

/// Seals envelopes and publishes them to topics.
///
/// Before an envelope leaves, an empty trace id is filled from the current
/// trace scope (or freshly generated) and an empty signature is computed
/// over the trace id. Values the caller already set are kept.
pub struct Publisher {
    signer: Arc<Signer>,
    topics: TopicRegistry,
}

impl Publisher {
    pub fn new(signer: Arc<Signer>, transport: Arc<dyn Transport>) -> Self {
        Self {
            signer,
            topics: TopicRegistry::new(transport),
        }
    }

    /// Topics resolved so far
    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Seal `envelope`, encode it and publish it with `filter_tag`.
    ///
    /// Serialization and transport failures are returned as they are; nothing
    /// is retried.
    #[instrument(skip_all, fields(topic_name = %topic_name, filter_tag = %filter_tag))]
    pub async fn publish(
        &self,
        topic_name: &TopicName,
        mut envelope: Envelope,
        filter_tag: &str,
    ) -> Result<PublishReceipt, MnsError> {
        let started = Instant::now();

        envelope.seal(&self.signer);
        let body = envelope.encode()?;

        let topic = self.topics.get_or_create(topic_name).await;
        let receipt = topic.endpoint().publish(body, filter_tag).await?;

        info!(
            message_id = %receipt.message_id,
            status_code = receipt.status_code,
            topic_name = %topic.name(),
            message_tag = %envelope.tag,
            filter_tag = %filter_tag,
            trace_id = %envelope.trace_id,
            publish_time = %Timestamp::now(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Published message"
        );

        Ok(receipt)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topics", &self.topics)
            .finish()
    }
}
