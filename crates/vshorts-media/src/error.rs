//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;
use vshorts_models::ErrorKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during acquisition, composition and execution.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        /// Tail of the tool's diagnostic output
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    /// A retrieval attempt failed; `kind` is the classified failure
    #[error("Download failed ({kind}): {message}")]
    DownloadFailed { kind: ErrorKind, message: String },

    #[error("Invalid pipeline: {0}")]
    CompositionInvariant(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a classified download failure.
    pub fn download_failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            kind,
            message: message.into(),
        }
    }

    pub fn composition(message: impl Into<String>) -> Self {
        Self::CompositionInvariant(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Semantic failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::DownloadFailed { kind, .. } => *kind,
            MediaError::CompositionInvariant(_) => ErrorKind::CompositionInvariantViolation,
            MediaError::Timeout(_) | MediaError::DeadlineExceeded => ErrorKind::Timeout,
            MediaError::FfmpegFailed { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::Cancelled => ErrorKind::Transient,
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::YtDlpNotFound
            | MediaError::FileNotFound(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::InvalidVideo(_)
            | MediaError::Internal(_) => ErrorKind::ExecutionFailure,
        }
    }

    /// Diagnostic tail captured from the external tool, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}
