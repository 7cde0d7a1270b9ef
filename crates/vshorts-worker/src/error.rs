//! Worker error types.

use thiserror::Error;

use vshorts_media::{Abort, AcquisitionFailure, MediaError};
use vshorts_models::{ErrorKind, FailureScope, FeatureSetError, JobFailure};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid job request: {0}")]
    InvalidRequest(#[from] FeatureSetError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionFailure),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Abort> for WorkerError {
    fn from(abort: Abort) -> Self {
        WorkerError::Media(abort.into())
    }
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Semantic failure class reported to the queue layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Acquisition(failure) => failure.kind,
            WorkerError::Media(e) => e.kind(),
            WorkerError::ConfigError(_)
            | WorkerError::InvalidRequest(_)
            | WorkerError::Io(_) => ErrorKind::ExecutionFailure,
        }
    }

    /// Which phase of the job the failure belongs to.
    pub fn scope(&self) -> FailureScope {
        match self {
            WorkerError::Acquisition(failure) => failure.scope,
            WorkerError::Media(MediaError::CompositionInvariant(_)) => FailureScope::Composition,
            WorkerError::Media(MediaError::DeadlineExceeded) => FailureScope::DeadlineExceeded,
            WorkerError::Media(MediaError::Cancelled) => FailureScope::Cancelled,
            _ => FailureScope::Execution,
        }
    }

    /// Check if the queue layer should run the job again.
    pub fn is_retryable(&self) -> bool {
        let kind = self.kind();
        !kind.is_permanent()
            && !kind.is_internal()
            && !matches!(
                self.scope(),
                FailureScope::Composition | FailureScope::DeadlineExceeded | FailureScope::Cancelled
            )
    }

    pub fn into_job_failure(self) -> JobFailure {
        match self {
            WorkerError::Acquisition(failure) => failure.into_job_failure(),
            other => {
                let mut message = other.to_string();
                if let WorkerError::Media(e) = &other {
                    if let Some(tail) = e.diagnostics().filter(|t| !t.is_empty()) {
                        message = format!("{message}\n{tail}");
                    }
                }
                JobFailure::new(other.kind(), other.scope(), message)
            }
        }
    }
}
