//! Span helpers for remote calls and task state changes.

use tracing::Span;

use crate::codec::Procedure;
use crate::model::{TaskId, TaskState};

/// Start a span covering one remote call.
///
/// `deque.result` is declared empty and filled in by [`record_result`].
pub fn start_call_span(tube: &str, procedure: Procedure) -> Span {
    tracing::debug_span!(
        "deque.call",
        "deque.tube" = tube,
        "deque.procedure" = procedure.name(),
        "deque.result" = tracing::field::Empty,
    )
}

pub fn record_result(span: &Span, result: &str) {
    span.record("deque.result", result);
}

/// Emit a state change event scoped to the given span.
pub fn record_state_transition(span: &Span, id: TaskId, from: TaskState, to: TaskState) {
    span.in_scope(|| {
        tracing::debug!(task.id = %id, from = from.name(), to = to.name(), "state_transition");
    });
}
