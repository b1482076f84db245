use tracing::trace;

// Metric events are emitted as trace records; the Prometheus recorder only
// serves whatever the exporter has registered.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "listing_desk.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn upload_batch(files: usize, elapsed_ms: u128, succeeded: bool) {
    trace!(
        target = "listing_desk.metrics",
        files = files as u64,
        elapsed_ms = elapsed_ms as u64,
        succeeded,
        "upload_batch"
    );
}

pub fn form_outcome(outcome: &'static str) {
    trace!(
        target = "listing_desk.metrics",
        outcome = outcome,
        "form_outcome"
    );
}
