//! Queue consumption engine.
//!
//! One [`QueueConsumer`] runs per queue that has a handler. Each consumer
//! loops forever:
//!
//! 1. Long-poll the queue for up to its wait window.
//! 2. Decode the body into an [`Envelope`]. Undecodable bodies are logged
//!    and left on the queue.
//! 3. Run the handler inside the envelope's trace scope.
//! 4. Delete the message if the handler succeeded. A failed handler leaves
//!    the message for redelivery after its visibility timeout.
//!
//! Failures never stop a consumer, a panicking handler included. Only
//! cancelling the [`ListenerHandle`] does, and a cancelled consumer finishes
//! the handler it is running before it exits. After a failed receive the
//! consumer pauses for the error's retry hint, or [`MIN_RETRY_PAUSE`] when
//! the error carries none.

use crate::envelope::Envelope;
use crate::error::MnsError;
use crate::handler::QueueHandler;
use crate::message::{QueueName, ReceivedMessage, Timestamp};
use crate::registry::Queue;
use crate::trace;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Extra time granted to a receive call beyond its long-poll window before
/// it is abandoned as hung
pub const RECEIVE_GRACE: Duration = Duration::from_secs(5);

/// Shortest pause between a failed receive and the next attempt
pub const MIN_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// What a single poll of a queue amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The wait window elapsed without a message
    Empty,

    /// The receive call failed; `retry_after` is the pause suggested by the error
    TransportFailed { retry_after: Option<Duration> },

    /// The body could not be decoded; the message stays on the queue
    Malformed,

    /// The handler succeeded and the message was deleted
    Acknowledged,

    /// The handler succeeded but deleting the message failed
    AcknowledgeFailed,

    /// The handler returned an error or panicked; the message stays on the queue
    HandlerFailed,
}

/// Polls one queue and dispatches its messages to the queue's handler
pub struct QueueConsumer {
    queue: Arc<Queue>,
    handler: Arc<dyn QueueHandler>,
}

impl QueueConsumer {
    /// Build a consumer for `queue`, or `None` if it has no handler
    pub fn for_queue(queue: Arc<Queue>) -> Option<Self> {
        let handler = Arc::clone(queue.handler()?);
        Some(Self { queue, handler })
    }

    pub fn queue_name(&self) -> &QueueName {
        self.queue.name()
    }

    /// Receive and process at most one message
    pub async fn poll_once(&self) -> PollOutcome {
        let received = self.receive().await;
        self.process(received).await
    }

    /// Poll until `cancel` fires.
    ///
    /// Cancellation interrupts a pending receive or a retry pause, but never
    /// a running handler.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            queue_name = %self.queue_name(),
            wait_seconds = self.queue.wait_time().as_secs(),
            "Queue consumer started"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.receive() => received,
            };

            if let PollOutcome::TransportFailed { retry_after } = self.process(received).await {
                let pause = retry_after.unwrap_or(MIN_RETRY_PAUSE);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(queue_name = %self.queue_name(), "Queue consumer stopped");
    }

    async fn receive(&self) -> Result<Option<ReceivedMessage>, MnsError> {
        let wait = self.queue.wait_time();
        let limit = wait + RECEIVE_GRACE;

        match tokio::time::timeout(limit, self.queue.endpoint().receive(wait)).await {
            Ok(result) => result,
            Err(_) => Err(MnsError::Timeout { duration: limit }),
        }
    }

    async fn process(&self, received: Result<Option<ReceivedMessage>, MnsError>) -> PollOutcome {
        match received {
            Ok(Some(message)) => self.dispatch(message).await,
            Ok(None) => {
                debug!(queue_name = %self.queue_name(), "No message within wait window");
                PollOutcome::Empty
            }
            Err(e) => {
                let retry_after = e.retry_after();
                error!(
                    queue_name = %self.queue_name(),
                    error = %e,
                    transient = e.is_transient(),
                    retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                    "Failed to receive message"
                );
                PollOutcome::TransportFailed { retry_after }
            }
        }
    }

    async fn dispatch(&self, message: ReceivedMessage) -> PollOutcome {
        let envelope = match Envelope::decode(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    queue_name = %self.queue_name(),
                    message_id = %message.message_id,
                    dequeue_count = message.dequeue_count,
                    error = %e,
                    "Failed to decode message body; message left on the queue"
                );
                return PollOutcome::Malformed;
            }
        };

        // Envelopes from producers that skip tracing still get a scope
        let trace_id = if envelope.trace_id.is_empty() {
            trace::new_trace_id()
        } else {
            envelope.trace_id.clone()
        };

        let span = info_span!(
            "mns.message",
            queue_name = %self.queue_name(),
            message_id = %message.message_id,
            trace_id = %trace_id,
        );

        self.handle(message, envelope, trace_id)
            .instrument(span)
            .await
    }

    async fn handle(
        &self,
        message: ReceivedMessage,
        envelope: Envelope,
        trace_id: String,
    ) -> PollOutcome {
        let tag = envelope.tag.clone();

        info!(
            queue_name = %self.queue_name(),
            message_id = %message.message_id,
            trace_id = %trace_id,
            tag = %tag,
            content = %envelope.content,
            dequeue_count = message.dequeue_count,
            receive_time = %Timestamp::now(),
            receipt_expires_at = %message.receipt_handle.expires_at(),
            "Received message"
        );

        let invocation = trace::scope(trace_id.clone(), self.handler.handle(envelope));
        let handled = AssertUnwindSafe(invocation).catch_unwind().await;

        let result = match handled {
            Ok(result) => result,
            Err(panic) => {
                error!(
                    queue_name = %self.queue_name(),
                    message_id = %message.message_id,
                    trace_id = %trace_id,
                    tag = %tag,
                    dequeue_count = message.dequeue_count,
                    panic = panic_message(&*panic),
                    "Message handler panicked; message left for redelivery"
                );
                return PollOutcome::HandlerFailed;
            }
        };

        if let Err(e) = result {
            warn!(
                queue_name = %self.queue_name(),
                message_id = %message.message_id,
                trace_id = %trace_id,
                tag = %tag,
                dequeue_count = message.dequeue_count,
                error = %format!("{:#}", e),
                "Message handler failed; message left for redelivery"
            );
            return PollOutcome::HandlerFailed;
        }

        match self.queue.endpoint().delete(&message.receipt_handle).await {
            Ok(()) => {
                info!(
                    queue_name = %self.queue_name(),
                    message_id = %message.message_id,
                    trace_id = %trace_id,
                    tag = %tag,
                    "Deleted processed message"
                );
                PollOutcome::Acknowledged
            }
            Err(e) => {
                warn!(
                    queue_name = %self.queue_name(),
                    message_id = %message.message_id,
                    trace_id = %trace_id,
                    tag = %tag,
                    error = %e,
                    "Failed to delete processed message; it may be redelivered"
                );
                PollOutcome::AcknowledgeFailed
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl std::fmt::Debug for QueueConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("queue", &self.queue)
            .finish()
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Running consumers started by [`spawn_consumers`].
///
/// Dropping the handle detaches the consumers; they keep running until the
/// runtime shuts down.
#[derive(Debug)]
pub struct ListenerHandle {
    cancel: CancellationToken,
    tasks: Vec<(QueueName, JoinHandle<()>)>,
}

impl ListenerHandle {
    /// Names of the queues being consumed
    pub fn queue_names(&self) -> Vec<&QueueName> {
        self.tasks.iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every consumer to stop without waiting for them
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every consumer and wait for in-flight handlers to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for (queue_name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(
                    queue_name = %queue_name,
                    error = %e,
                    "Queue consumer task ended abnormally"
                );
            }
        }
    }
}

/// Start one consumer task per queue that has a handler.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_consumers<I>(queues: I) -> ListenerHandle
where
    I: IntoIterator<Item = Arc<Queue>>,
{
    let cancel = CancellationToken::new();

    let tasks = queues
        .into_iter()
        .filter_map(QueueConsumer::for_queue)
        .map(|consumer| {
            let queue_name = consumer.queue_name().clone();
            let span = info_span!("mns.consumer", queue_name = %queue_name);
            let task = tokio::spawn(consumer.run(cancel.clone()).instrument(span));
            (queue_name, task)
        })
        .collect();

    ListenerHandle { cancel, tasks }
}
