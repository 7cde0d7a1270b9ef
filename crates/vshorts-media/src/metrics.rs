//! Acquisition and pipeline metrics.
//!
//! Recorded through the `metrics` facade; a no-op unless the binary installs
//! a recorder.

use metrics::{counter, histogram};
use vshorts_models::ErrorKind;

// =============================================================================
// Metric Names
// =============================================================================

pub mod names {
    /// Retrieval attempts by strategy and outcome.
    pub const DOWNLOAD_ATTEMPTS_TOTAL: &str = "download_attempts_total";

    /// Same-strategy retries by strategy and error kind.
    pub const DOWNLOAD_RETRIES_TOTAL: &str = "download_retries_total";

    /// Transcoder runs by outcome.
    pub const PIPELINE_RUNS_TOTAL: &str = "pipeline_runs_total";

    /// Transcoder wall-clock time in seconds.
    pub const PIPELINE_DURATION_SECONDS: &str = "pipeline_duration_seconds";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_download_attempt(strategy: &str, outcome: &'static str) {
    counter!(
        names::DOWNLOAD_ATTEMPTS_TOTAL,
        "strategy" => strategy.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_download_retry(strategy: &str, kind: ErrorKind) {
    counter!(
        names::DOWNLOAD_RETRIES_TOTAL,
        "strategy" => strategy.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

pub fn record_pipeline_run(outcome: &'static str, duration_secs: f64) {
    counter!(names::PIPELINE_RUNS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::DOWNLOAD_ATTEMPTS_TOTAL.ends_with("_total"));
        assert!(names::DOWNLOAD_RETRIES_TOTAL.contains("retries"));
        assert!(names::PIPELINE_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_download_attempt("desktop_web", "failed");
        record_download_retry("desktop_web", ErrorKind::RateLimited);
        record_pipeline_run("succeeded", 1.5);
    }
}
