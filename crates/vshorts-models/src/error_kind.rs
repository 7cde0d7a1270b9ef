//! Failure taxonomy shared by acquisition, composition and execution.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic class of a failure.
///
/// The first seven kinds are produced by the error classifier for retrieval
/// failures; the last two only arise from composition and execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Video is unavailable (age-restricted, geo-blocked, not yet premiered, ...)
    Unavailable,
    /// Video is private
    Private,
    /// Video was removed by the uploader or the platform
    Removed,
    /// Platform answered with an automated-client challenge
    BotDetection,
    /// HTTP 429 or an explicit throttling signal
    RateLimited,
    /// Tool-level or socket-level timeout
    Timeout,
    /// Anything else
    Transient,
    /// A pipeline stage referenced a stream no earlier stage produced
    CompositionInvariantViolation,
    /// The transcoding tool could not be run at all
    ExecutionFailure,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: &'static [ErrorKind] = &[
        ErrorKind::Unavailable,
        ErrorKind::Private,
        ErrorKind::Removed,
        ErrorKind::BotDetection,
        ErrorKind::RateLimited,
        ErrorKind::Timeout,
        ErrorKind::Transient,
        ErrorKind::CompositionInvariantViolation,
        ErrorKind::ExecutionFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Private => "private",
            ErrorKind::Removed => "removed",
            ErrorKind::BotDetection => "bot_detection",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::CompositionInvariantViolation => "composition_invariant_violation",
            ErrorKind::ExecutionFailure => "execution_failure",
        }
    }

    /// Content-level failures where no retry can ever help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ErrorKind::Unavailable | ErrorKind::Private | ErrorKind::Removed
        )
    }

    /// The platform is blocking us for now; a later job-level retry may pass.
    pub fn is_temporary_block(&self) -> bool {
        matches!(self, ErrorKind::BotDetection | ErrorKind::RateLimited)
    }

    /// Defects in our own pipeline rather than conditions of the source.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ErrorKind::CompositionInvariantViolation | ErrorKind::ExecutionFailure
        )
    }

    /// Human-readable category used in failure reports.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorKind::Unavailable => "video is unavailable",
            ErrorKind::Private => "video is private",
            ErrorKind::Removed => "video was removed",
            ErrorKind::BotDetection => "temporarily blocked by bot detection",
            ErrorKind::RateLimited => "temporarily rate limited",
            ErrorKind::Timeout => "operation timed out",
            ErrorKind::Transient => "temporary failure",
            ErrorKind::CompositionInvariantViolation => "invalid processing pipeline",
            ErrorKind::ExecutionFailure => "processing tool failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of consulting the retry policy. Computed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay_secs: u64,
}

impl RetryDecision {
    /// Do not retry.
    pub const fn stop() -> Self {
        Self {
            should_retry: false,
            delay_secs: 0,
        }
    }

    /// Retry after the given delay.
    pub const fn retry_after(delay_secs: u64) -> Self {
        Self {
            should_retry: true,
            delay_secs,
        }
    }

    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_kinds() {
        let permanent: Vec<_> = ErrorKind::ALL
            .iter()
            .filter(|k| k.is_permanent())
            .copied()
            .collect();
        assert_eq!(
            permanent,
            vec![ErrorKind::Unavailable, ErrorKind::Private, ErrorKind::Removed]
        );
    }

    #[test]
    fn test_kind_classes_are_disjoint() {
        for kind in ErrorKind::ALL {
            let classes = [
                kind.is_permanent(),
                kind.is_temporary_block(),
                kind.is_internal(),
            ];
            assert!(classes.iter().filter(|c| **c).count() <= 1, "{kind}");
        }
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BotDetection).unwrap();
        assert_eq!(json, "\"bot_detection\"");
        let kind: ErrorKind = serde_json::from_str("\"rate_limited\"").unwrap();
        assert_eq!(kind, ErrorKind::RateLimited);
    }

    #[test]
    fn test_retry_decision_constructors() {
        assert!(!RetryDecision::stop().should_retry);
        let decision = RetryDecision::retry_after(90);
        assert!(decision.should_retry);
        assert_eq!(decision.delay(), std::time::Duration::from_secs(90));
    }
}
