use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    requests_published: AtomicU64,
    publish_failures: AtomicU64,
    events_received: AtomicU64,
    decode_failures: AtomicU64,
    records_succeeded: AtomicU64,
    records_failed: AtomicU64,
    duplicates_skipped: AtomicU64,
    anomalies: AtomicU64,
    unknown_content: AtomicU64,
    messages_retained: AtomicU64,
    chunks_indexed: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request event that reached the outbound queue.
    pub fn record_published(&self) {
        self.requests_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a publish that gave up.
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message pulled from the status queue.
    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message body that did not decode into an event.
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record moved to SUCCESS along with its indexed chunk count.
    pub fn record_success(&self, chunk_count: u64) {
        self.records_succeeded.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a record moved to FAILED.
    pub fn record_failure(&self) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event ignored because its record was already terminal.
    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event that tried to flip a terminal status.
    pub fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event whose content id matches no record.
    pub fn record_unknown_content(&self) {
        self.unknown_content.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message left on the queue for redelivery.
    pub fn record_retained(&self) {
        self.messages_retained.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_published: self.requests_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            records_succeeded: self.records_succeeded.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            unknown_content: self.unknown_content.load(Ordering::Relaxed),
            messages_retained: self.messages_retained.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Request events accepted by the outbound queue.
    pub requests_published: u64,
    /// Publishes that exhausted their retries or failed permanently.
    pub publish_failures: u64,
    /// Messages received from the status queue.
    pub events_received: u64,
    /// Messages that failed to decode.
    pub decode_failures: u64,
    /// Records moved to SUCCESS.
    pub records_succeeded: u64,
    /// Records moved to FAILED.
    pub records_failed: u64,
    /// Events skipped because the record was already terminal.
    pub duplicates_skipped: u64,
    /// Events rejected as illegal transitions.
    pub anomalies: u64,
    /// Events referencing unknown content.
    pub unknown_content: u64,
    /// Messages left unacknowledged for redelivery.
    pub messages_retained: u64,
    /// Total chunks written to the index.
    pub chunks_indexed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_outcomes_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_success(2);
        metrics.record_success(3);
        metrics.record_failure();
        metrics.record_duplicate();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_succeeded, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(snapshot.duplicates_skipped, 1);
    }

    #[test]
    fn snapshot_starts_empty_and_serializes_camel_case() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());

        metrics.record_published();
        let json = serde_json::to_value(metrics.snapshot()).expect("json");
        assert_eq!(json["requestsPublished"], 1);
        assert_eq!(json["messagesRetained"], 0);
    }
}
