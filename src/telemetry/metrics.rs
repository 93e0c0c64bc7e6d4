//! Metric instrument factories for tarantool-deque.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a registered provider every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("tarantool-deque")
}

/// Counter: remote calls issued.
/// Labels: `tube`, `procedure`, `result` ("ok" | "empty" | "error" | "timeout").
pub fn calls() -> Counter<u64> {
    meter()
        .u64_counter("deque.calls")
        .with_description("Number of remote queue calls")
        .build()
}

/// Counter: confirmed task state changes.
/// Labels: `tube`, `from`, `to`.
pub fn task_transitions() -> Counter<u64> {
    meter()
        .u64_counter("deque.task.transitions")
        .with_description("Number of task state changes confirmed by the server")
        .build()
}

/// Histogram: round-trip time of a remote call in milliseconds.
/// Labels: `procedure`.
pub fn call_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("deque.call.duration_ms")
        .with_description("Remote call round-trip time")
        .with_unit("ms")
        .build()
}

/// Counter: connections opened (including reconnects after a reset).
pub fn connects() -> Counter<u64> {
    meter()
        .u64_counter("deque.connects")
        .with_description("Number of connections opened")
        .build()
}
