//! Per-job deadline and cancellation.
//!
//! Every suspension point of a job (backoff sleep, external process wait)
//! races [`JobControl::aborted`] so that an expired or cancelled job stops
//! promptly.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::MediaError;

/// Why a job stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Cancelled,
    DeadlineExceeded,
}

impl From<Abort> for MediaError {
    fn from(abort: Abort) -> Self {
        match abort {
            Abort::Cancelled => MediaError::Cancelled,
            Abort::DeadlineExceeded => MediaError::DeadlineExceeded,
        }
    }
}

/// Deadline plus cancellation signal for one job.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl JobControl {
    /// No deadline, never cancelled.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now. A timeout too large to represent as an
    /// instant leaves the control without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails if the job is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Abort> {
        if self.is_cancelled() {
            Err(Abort::Cancelled)
        } else if self.is_expired() {
            Err(Abort::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resolves once the job is cancelled or its deadline passes. Never
    /// resolves for an unbounded control.
    pub async fn aborted(&self) -> Abort {
        let mut cancel = self.cancel.clone();
        let cancelled = async {
            if let Some(rx) = cancel.as_mut() {
                if rx.wait_for(|c| *c).await.is_ok() {
                    return;
                }
            }
            // sender gone or no channel: cancellation can never arrive
            std::future::pending::<()>().await
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Abort::Cancelled,
            _ = expired => Abort::DeadlineExceeded,
        }
    }

    /// Sleep for `duration` unless the job is aborted first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Abort> {
        self.check()?;
        tokio::select! {
            biased;
            abort = self.aborted() => Err(abort),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let control = JobControl::unbounded().with_timeout(Duration::from_secs(u64::MAX));
        assert!(control.deadline().is_none());
        assert_eq!(control.check(), Ok(()));

        let control = JobControl::unbounded().with_timeout(Duration::from_secs(60));
        assert_eq!(control.remaining(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_limits() {
        let control = JobControl::unbounded();
        assert_eq!(control.sleep(Duration::from_secs(90)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let control = JobControl::unbounded().with_timeout(Duration::from_secs(10));
        let started = Instant::now();
        assert_eq!(
            control.sleep(Duration::from_secs(90)).await,
            Err(Abort::DeadlineExceeded)
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert!(control.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let (tx, rx) = watch::channel(false);
        let control = JobControl::unbounded().with_cancel(rx);

        let handle = tokio::spawn(async move { control.sleep(Duration::from_secs(90)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), Err(Abort::Cancelled));
    }

    #[test]
    fn test_aborted_waits_for_cancel_signal() {
        let (tx, rx) = watch::channel(false);
        let control = JobControl::unbounded().with_cancel(rx);
        let mut aborted = tokio_test::task::spawn(control.aborted());

        tokio_test::assert_pending!(aborted.poll());
        tx.send(true).unwrap();
        assert!(aborted.is_woken());
        tokio_test::assert_ready_eq!(aborted.poll(), Abort::Cancelled);
    }

    #[test]
    fn test_check_already_cancelled() {
        let (tx, rx) = watch::channel(false);
        let control = JobControl::unbounded().with_cancel(rx);
        assert!(control.check().is_ok());
        tx.send(true).unwrap();
        assert_eq!(control.check(), Err(Abort::Cancelled));
    }
}
