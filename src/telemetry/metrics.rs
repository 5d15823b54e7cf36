//! Metric instrument factories for audit-tracker.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"audit-tracker"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for audit-tracker instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("audit-tracker")
}

/// Counter: number of tasks created.
/// Labels: `source` ("admin" | "import").
pub fn tasks_created() -> Counter<u64> {
    meter()
        .u64_counter("audit.tasks.created")
        .with_description("Number of tasks created")
        .build()
}

/// Counter: committed task status transitions.
/// Labels: `from`, `to`, `action`.
pub fn task_transitions() -> Counter<u64> {
    meter()
        .u64_counter("audit.task.transitions")
        .with_description("Number of task status transitions")
        .build()
}

/// Counter: transition requests that were refused.
/// Labels: `action`, `reason` (see `Error::kind`).
pub fn transitions_rejected() -> Counter<u64> {
    meter()
        .u64_counter("audit.task.transitions_rejected")
        .with_description("Number of refused transition requests")
        .build()
}

/// Counter: notification sink failures after a committed transition.
pub fn notification_failures() -> Counter<u64> {
    meter()
        .u64_counter("audit.notifications.failed")
        .with_description("Status-change events the sink failed to accept")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("audit.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
