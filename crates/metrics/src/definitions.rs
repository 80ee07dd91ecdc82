//! Metric name and label definitions.
//!
//! All metric names used by the workspace live here so the exported set is
//! documented in one place.

/// Outbound admission control metrics
pub mod transport {
    /// Tokens granted, labelled by `scope` (global, recipient)
    pub const ADMISSIONS_TOTAL: &str = "switchboard_transport_admissions_total";
    /// Acquisitions abandoned because the caller cancelled
    pub const ADMISSIONS_CANCELLED_TOTAL: &str = "switchboard_transport_admissions_cancelled_total";
    /// Time spent waiting for admission in seconds
    pub const ADMISSION_WAIT_SECONDS: &str = "switchboard_transport_admission_wait_seconds";
    /// Per-recipient buckets currently held
    pub const RECIPIENT_BUCKETS: &str = "switchboard_transport_recipient_buckets";
    /// Per-recipient buckets evicted for idleness or capacity
    pub const RECIPIENT_EVICTIONS_TOTAL: &str = "switchboard_transport_recipient_evictions_total";
    /// Outbound requests sent, labelled by `method`
    pub const REQUESTS_TOTAL: &str = "switchboard_transport_requests_total";
    /// Outbound requests that failed, labelled by `method`
    pub const REQUEST_ERRORS_TOTAL: &str = "switchboard_transport_request_errors_total";
    /// Platform flood-control replies that were waited out
    pub const RETRY_AFTER_TOTAL: &str = "switchboard_transport_retry_after_total";
}

/// Update ingestion metrics
pub mod updates {
    /// Updates handed to the dispatch path, labelled by `source` (polling, webhook)
    pub const RECEIVED_TOTAL: &str = "switchboard_updates_received_total";
    /// Updates discarded (drop-pending backlog, undecodable webhook bodies)
    pub const DROPPED_TOTAL: &str = "switchboard_updates_dropped_total";
    /// Fetch failures that terminated a polling loop
    pub const FETCH_FAILURES_TOTAL: &str = "switchboard_updates_fetch_failures_total";
    /// Long-poll round trip duration in seconds
    pub const FETCH_DURATION_SECONDS: &str = "switchboard_updates_fetch_duration_seconds";
}

/// Session dispatcher metrics
pub mod sessions {
    /// Session handlers created by the factory
    pub const CREATED_TOTAL: &str = "switchboard_sessions_created_total";
    /// Session handlers currently registered
    pub const ACTIVE: &str = "switchboard_sessions_active";
    /// Update tasks spawned
    pub const DISPATCHED_TOTAL: &str = "switchboard_sessions_dispatched_total";
}

/// Router metrics
pub mod routing {
    /// Updates a route handled successfully
    pub const HANDLED_TOTAL: &str = "switchboard_routing_handled_total";
    /// Updates that reached the not-found path
    pub const NOT_FOUND_TOTAL: &str = "switchboard_routing_not_found_total";
    /// Handler errors passed to the error handler
    pub const ERRORS_TOTAL: &str = "switchboard_routing_errors_total";
    /// Handler panics converted by the recover handler
    pub const PANICS_RECOVERED_TOTAL: &str = "switchboard_routing_panics_recovered_total";
    /// Conversation state transitions committed
    pub const STATE_TRANSITIONS_TOTAL: &str = "switchboard_routing_state_transitions_total";
}

/// Common label keys
pub mod labels {
    pub const SCOPE: &str = "scope";
    pub const SOURCE: &str = "source";
    pub const METHOD: &str = "method";
    pub const REASON: &str = "reason";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Admission waits: from immediate grants to multi-second per-recipient waits
    pub const ADMISSION_WAIT: &[f64] = &[
        0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0,
    ];

    /// Long-poll round trips up to the maximum poll timeout
    pub const FETCH_DURATION: &[f64] = &[
        0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 90.0, 120.0,
    ];
}
