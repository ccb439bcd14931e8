//! Queue message handlers.

use crate::envelope::Envelope;
use async_trait::async_trait;
use std::future::Future;

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// Processes envelopes received from a queue.
///
/// Returning `Ok(())` acknowledges the message, which deletes it from the
/// queue. Returning an error leaves the message in place; the transport
/// redelivers it once its visibility timeout lapses, so handlers must
/// tolerate seeing the same envelope more than once.
///
/// Any `Fn(Envelope) -> impl Future<Output = anyhow::Result<()>>` is a handler:
///
/// ```rust
/// use mns_runtime::{Envelope, QueueHandler};
///
/// let handler = |envelope: Envelope| async move {
///     anyhow::ensure!(!envelope.tag.is_empty(), "untagged envelope");
///     anyhow::Ok(())
/// };
/// # fn assert_handler<H: QueueHandler>(_: &H) {}
/// # assert_handler(&handler);
/// ```
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Process one envelope
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> QueueHandler for F
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        (self)(envelope).await
    }
}
