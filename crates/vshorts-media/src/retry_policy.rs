//! Differentiated retry policy for retrieval failures.
//!
//! The remote platform's rate-limit window is measured in minutes, so the
//! backoff starts at 90 seconds and doubles per attempt.

use std::time::Duration;
use vshorts_models::{ErrorKind, RetryDecision};

/// Retry knobs per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt; doubles each step
    pub base_delay_secs: u64,
    /// Retries allowed for bot-detection failures
    pub bot_detection_retries: u32,
    /// Retries allowed for rate-limit, timeout and transient failures
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 90,
            bot_detection_retries: 1,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Decide after attempt `attempt_index` (1-based; 0 is read as 1) failed
    /// with `kind`.
    pub fn decide(&self, kind: ErrorKind, attempt_index: u32) -> RetryDecision {
        let attempt = attempt_index.max(1);

        let budget = match kind {
            ErrorKind::Unavailable
            | ErrorKind::Private
            | ErrorKind::Removed
            | ErrorKind::CompositionInvariantViolation
            | ErrorKind::ExecutionFailure => 0,
            ErrorKind::BotDetection => self.bot_detection_retries,
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Transient => self.max_retries,
        };

        if attempt > budget {
            return RetryDecision::stop();
        }
        RetryDecision::retry_after(self.delay_for_attempt(attempt).as_secs())
    }

    /// Backoff before the retry that follows attempt `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1).saturating_sub(1).min(16);
        Duration::from_secs(self.base_delay_secs.saturating_mul(1u64 << exponent))
    }
}

/// [`RetryPolicy::decide`] with the default policy.
pub fn decide(kind: ErrorKind, attempt_index: u32) -> RetryDecision {
    RetryPolicy::default().decide(kind, attempt_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_never_retry() {
        for kind in [ErrorKind::Unavailable, ErrorKind::Private, ErrorKind::Removed] {
            for attempt in 0..10 {
                assert!(!decide(kind, attempt).should_retry, "{kind} @ {attempt}");
            }
        }
    }

    #[test]
    fn test_bot_detection_retries_once() {
        assert_eq!(decide(ErrorKind::BotDetection, 1), RetryDecision::retry_after(90));
        for attempt in 2..6 {
            assert!(!decide(ErrorKind::BotDetection, attempt).should_retry);
        }
    }

    #[test]
    fn test_generic_schedule() {
        for kind in [ErrorKind::RateLimited, ErrorKind::Timeout, ErrorKind::Transient] {
            assert_eq!(decide(kind, 1), RetryDecision::retry_after(90));
            assert_eq!(decide(kind, 2), RetryDecision::retry_after(180));
            assert_eq!(decide(kind, 3), RetryDecision::retry_after(360));
            assert!(!decide(kind, 4).should_retry);
            assert!(!decide(kind, 100).should_retry);
        }
    }

    #[test]
    fn test_internal_kinds_never_retry() {
        assert!(!decide(ErrorKind::CompositionInvariantViolation, 1).should_retry);
        assert!(!decide(ErrorKind::ExecutionFailure, 1).should_retry);
    }

    #[test]
    fn test_zero_index_is_first_attempt() {
        assert_eq!(decide(ErrorKind::Transient, 0), decide(ErrorKind::Transient, 1));
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for_attempt(u32::MAX) > Duration::ZERO);
    }
}
