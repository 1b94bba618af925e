//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric descriptions for the job lifecycle
//! - Rendering for the `/metrics` endpoint
//!
//! The job metrics themselves are recorded where the events happen:
//! submission in `routes::analysis`, outcome and duration in the job runner,
//! eviction in the sweeper.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "analysis_jobs_submitted_total",
        "Analysis jobs accepted by the submission endpoint"
    );
    describe_counter!(
        "analysis_jobs_finished_total",
        "Analysis jobs that reached a terminal state, by outcome"
    );
    describe_counter!(
        "analysis_jobs_swept_total",
        "Jobs evicted by the retention sweep"
    );
    describe_histogram!(
        "analysis_job_duration_seconds",
        Unit::Seconds,
        "Wall time of analyzer runs, from permit to exit"
    );
    describe_gauge!(
        "analysis_jobs_running",
        "Analyzer processes currently running"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}
