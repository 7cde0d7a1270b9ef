//! Job submission and result types exchanged with the queue layer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error_kind::ErrorKind;
use crate::features::FeatureSet;
use crate::fragment::Fragment;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the source media comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    /// Remote address resolved by the strategy orchestrator
    Url { url: String },
    /// File already on local disk (user upload)
    LocalFile { path: PathBuf },
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url { url } => write!(f, "{url}"),
            SourceRef::LocalFile { path } => write!(f, "{}", path.display()),
        }
    }
}

/// One unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRequest {
    #[serde(default)]
    pub job_id: JobId,

    pub source: SourceRef,

    #[serde(default)]
    pub features: FeatureSet,

    /// Output file, or output directory when fragmenting
    pub output_path: PathBuf,

    /// Wall-clock deadline for the whole job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl JobRequest {
    pub fn new(source: SourceRef, output_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id: JobId::new(),
            source,
            features: FeatureSet::default(),
            output_path: output_path.into(),
            deadline: None,
        }
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Retrieved source media. Ownership of `path` passes to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// How one retrieval attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { kind: ErrorKind, message: String },
    Aborted,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::Failed { .. } => "failed",
            AttemptOutcome::Aborted => "aborted",
        }
    }
}

/// Record of one retrieval attempt within one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadAttempt {
    pub strategy: String,
    /// "primary" or the alternative form's label
    pub address_form: String,
    pub address: String,
    /// 1-based attempt number within this strategy and address
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// Why a job ended without output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    /// Content error; no further attempts were made
    Permanent,
    /// Every strategy failed and there were no alternative addresses
    StrategiesExhausted,
    /// Every strategy and every alternative address failed
    AlternativesExhausted,
    /// The processing pipeline could not be built
    Composition,
    /// The transcoding step failed
    Execution,
    DeadlineExceeded,
    Cancelled,
}

/// Terminal failure report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub category: String,
    pub scope: FailureScope,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<DownloadAttempt>,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, scope: FailureScope, message: impl Into<String>) -> Self {
        Self {
            kind,
            category: kind.category().to_string(),
            scope,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<DownloadAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    /// Whether the queue layer should schedule another run of the job.
    pub fn should_retry_job(&self) -> bool {
        match self.scope {
            FailureScope::Permanent
            | FailureScope::Composition
            | FailureScope::DeadlineExceeded
            | FailureScope::Cancelled => false,
            _ => !self.kind.is_permanent() && !self.kind.is_internal(),
        }
    }

    /// Category-specific text suitable for an end user.
    pub fn user_message(&self) -> String {
        if self.kind.is_permanent() {
            return format!("The {}.", self.category);
        }

        let prefix = match self.scope {
            FailureScope::StrategiesExhausted => "All download strategies failed",
            FailureScope::AlternativesExhausted => {
                "All download strategies and alternative addresses failed"
            }
            FailureScope::Composition | FailureScope::Execution => "Video processing failed",
            FailureScope::DeadlineExceeded => "The job ran out of time",
            FailureScope::Cancelled => return "The job was cancelled.".to_string(),
            FailureScope::Permanent => "The video cannot be processed",
        };

        if self.kind.is_temporary_block() && self.should_retry_job() {
            format!(
                "{prefix}: {}. An automatic retry has been scheduled.",
                self.category
            )
        } else {
            format!("{prefix}: {}.", self.category)
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.kind, self.scope, self.message)
    }
}

/// Output files of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputArtifact {
    Single { path: PathBuf },
    Fragments { fragments: Vec<Fragment> },
}

/// Final result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        job_id: JobId,
        media: DownloadedMedia,
        artifact: OutputArtifact,
    },
    Failed {
        job_id: JobId,
        failure: JobFailure,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobOutcome::Completed { job_id, .. } | JobOutcome::Failed { job_id, .. } => job_id,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Failed { failure, .. } => Some(failure),
            JobOutcome::Completed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_failure_message_and_no_retry() {
        let failure = JobFailure::new(ErrorKind::Private, FailureScope::Permanent, "Private video");
        assert!(!failure.should_retry_job());
        assert_eq!(failure.user_message(), "The video is private.");
    }

    #[test]
    fn test_temporary_block_schedules_retry() {
        let failure = JobFailure::new(
            ErrorKind::BotDetection,
            FailureScope::StrategiesExhausted,
            "Sign in to confirm you're not a bot",
        );
        assert!(failure.should_retry_job());
        let msg = failure.user_message();
        assert!(msg.starts_with("All download strategies failed"));
        assert!(msg.contains("automatic retry"));
    }

    #[test]
    fn test_exhausted_scopes_are_distinguished() {
        let a = JobFailure::new(ErrorKind::Transient, FailureScope::StrategiesExhausted, "x");
        let b = JobFailure::new(ErrorKind::Transient, FailureScope::AlternativesExhausted, "x");
        assert_ne!(a.user_message(), b.user_message());
        assert!(b.user_message().contains("alternative addresses"));
    }

    #[test]
    fn test_internal_failures_do_not_retry() {
        let failure = JobFailure::new(
            ErrorKind::CompositionInvariantViolation,
            FailureScope::Composition,
            "dangling label",
        );
        assert!(!failure.should_retry_job());

        let failure = JobFailure::new(ErrorKind::Transient, FailureScope::Execution, "exit 1");
        assert!(failure.should_retry_job());
    }

    #[test]
    fn test_job_request_from_json() {
        let json = r#"{
            "job_id": "job-1",
            "source": {"type": "url", "url": "https://youtu.be/dQw4w9WgXcQ"},
            "output_path": "/tmp/out.mp4"
        }"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.job_id.as_str(), "job-1");
        assert!(request.deadline.is_none());
        assert!(!request.features.has_title());
        assert_eq!(request.source.to_string(), "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = JobOutcome::Failed {
            job_id: JobId::from_string("j"),
            failure: JobFailure::new(ErrorKind::Removed, FailureScope::Permanent, "removed"),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["failure"]["kind"], "removed");
        assert_eq!(value["failure"]["category"], "video was removed");
    }
}
