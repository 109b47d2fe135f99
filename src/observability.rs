use std::net::SocketAddr;

use crate::coordinator::SubmissionState;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: finished submissions. Labels: outcome.
pub const SUBMISSIONS_TOTAL: &str = "roomslot_submissions_total";

/// Histogram: submission latency in seconds, validation through commit.
pub const SUBMIT_DURATION_SECONDS: &str = "roomslot_submit_duration_seconds";

/// Counter: wire requests handled. Labels: op.
pub const REQUESTS_TOTAL: &str = "roomslot_requests_total";

/// Counter: committed reservations found to overlap an existing one.
pub const DOUBLE_BOOKINGS_TOTAL: &str = "roomslot_double_bookings_total";

/// Counter: confirmation emails that could not be dispatched.
pub const NOTIFICATION_FAILURES_TOTAL: &str = "roomslot_notification_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roomslot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomslot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomslot_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomslot_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for the state a submission ended in.
pub fn outcome_label(state: SubmissionState) -> &'static str {
    match state {
        SubmissionState::Confirmed => "confirmed",
        SubmissionState::ValidationFailed => "validation_failed",
        SubmissionState::ConflictDetected => "conflict",
        SubmissionState::WriteFailed => "write_failed",
        SubmissionState::Idle
        | SubmissionState::Validating
        | SubmissionState::FetchingFreshSnapshot
        | SubmissionState::RevalidatingConflict
        | SubmissionState::Committing => "abandoned",
    }
}
