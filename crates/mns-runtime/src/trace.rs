//! Trace-id propagation across publish and consume.
//!
//! A trace id is scoped to a task with [`scope`]. The publisher stamps
//! envelopes that carry no trace id with [`current_or_new`], and the consumer
//! runs every handler inside a scope holding the inbound envelope's trace id.
//! Messages published from a handler therefore continue the trace of the
//! message being processed.

use std::future::Future;

#[cfg(test)]
#[path = "trace_tests.rs"]
mod tests;

tokio::task_local! {
    static TRACE_ID: String;
}

/// Generate a fresh trace id
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Trace id of the enclosing [`scope`], if any
pub fn current() -> Option<String> {
    TRACE_ID
        .try_with(|id| id.clone())
        .ok()
        .filter(|id| !id.is_empty())
}

/// Trace id of the enclosing [`scope`], or a fresh one outside any scope
pub fn current_or_new() -> String {
    current().unwrap_or_else(new_trace_id)
}

/// Run `future` with `trace_id` as the current trace id
pub async fn scope<F>(trace_id: String, future: F) -> F::Output
where
    F: Future,
{
    TRACE_ID.scope(trace_id, future).await
}
