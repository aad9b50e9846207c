//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions for the RAG platform services.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the process-wide Prometheus recorder and return a handle whose
/// `render()` produces the text exposition format for a `/metrics` route.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Metrics prefix for all RAG platform metrics
pub const METRICS_PREFIX: &str = "rag";

/// SLO-aligned histogram buckets for request latency (in seconds).
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.075, 0.100, 0.150, 0.250, 0.500, 1.000, 2.500, 5.000,
    10.00,
];

/// Register all metric descriptions. Call once at service startup.
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_ingestion_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total ingestion pipeline runs, by outcome"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Ingestion pipeline run latency in seconds"
    );

    describe_counter!(
        format!("{}_chunks_added_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks written to the vector collection"
    );

    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents successfully loaded and split"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval query latency in seconds"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM generation latency in seconds"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM provider errors, by class"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Orchestrator chat end-to-end latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics for an HTTP handler.
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record the outcome of one ingestion run.
pub fn record_ingestion_run(duration_secs: f64, documents: usize, chunks: usize, had_errors: bool) {
    let outcome = if had_errors { "completed_with_errors" } else { "completed" };

    counter!(
        format!("{}_ingestion_runs_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    counter!(format!("{}_documents_processed_total", METRICS_PREFIX)).increment(documents as u64);
    counter!(format!("{}_chunks_added_total", METRICS_PREFIX)).increment(chunks as u64);
}

/// Record a retrieval query.
pub fn record_retrieval(duration_secs: f64) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record an LLM generation call.
pub fn record_generation(duration_secs: f64, success: bool) {
    histogram!(format!("{}_generation_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    if !success {
        counter!(format!("{}_generation_errors_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record a full chat orchestration round trip.
pub fn record_chat(duration_secs: f64) {
    histogram!(format!("{}_chat_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.150));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/api/v1/status");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(200);
    }
}
