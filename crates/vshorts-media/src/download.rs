//! Source acquisition with multiple fallback strategies.
//!
//! [`StrategyOrchestrator::acquire`] walks the strategy registry in priority
//! order. Each failure is classified and the retry policy decides whether the
//! same strategy is tried again (after a long backoff) or the next strategy
//! takes over. When every strategy has failed, the last strategy makes one
//! pass over the alternative address forms. Attempts are strictly
//! sequential.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use vshorts_models::{
    alternative_address_forms, AttemptOutcome, DownloadAttempt, DownloadedMedia, ErrorKind,
    FailureScope, JobFailure,
};

use crate::classify::{classify, RawFailure};
use crate::control::{Abort, JobControl};
use crate::fs_utils::{file_size, find_downloaded_file, remove_partial_downloads, SOURCE_STEM};
use crate::metrics;
use crate::retry_policy::RetryPolicy;
use crate::strategy::{DownloadStrategy, StrategyRegistry};

/// Why a single retrieval attempt did not produce media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The attempt ran and failed; the evidence is classified by the caller
    Failed(RawFailure),
    /// The retrieval tool is not installed; no strategy can succeed
    ToolMissing(String),
    /// The job was cancelled or ran out of time mid-attempt
    Aborted(Abort),
}

/// One attempt of one strategy against one address.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        strategy: &DownloadStrategy,
        address: &str,
        dest_dir: &Path,
        control: &JobControl,
    ) -> Result<DownloadedMedia, AttemptError>;
}

#[async_trait]
impl<T: Retriever + ?Sized> Retriever for Arc<T> {
    async fn retrieve(
        &self,
        strategy: &DownloadStrategy,
        address: &str,
        dest_dir: &Path,
        control: &JobControl,
    ) -> Result<DownloadedMedia, AttemptError> {
        (**self).retrieve(strategy, address, dest_dir, control).await
    }
}

/// Metadata printed by yt-dlp after the file was moved into place.
#[derive(Debug, Deserialize)]
struct AfterMoveInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    filepath: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
}

/// Last JSON object line on yt-dlp's stdout.
fn parse_after_move(stdout: &str) -> Option<AfterMoveInfo> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

/// [`Retriever`] backed by the yt-dlp CLI.
#[derive(Debug, Clone)]
pub struct YtDlpRetriever {
    program: PathBuf,
}

impl Default for YtDlpRetriever {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
        }
    }
}

impl YtDlpRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Retriever for YtDlpRetriever {
    async fn retrieve(
        &self,
        strategy: &DownloadStrategy,
        address: &str,
        dest_dir: &Path,
        control: &JobControl,
    ) -> Result<DownloadedMedia, AttemptError> {
        let program = which::which(&self.program)
            .map_err(|e| AttemptError::ToolMissing(format!("yt-dlp not found: {e}")))?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| AttemptError::Failed(RawFailure::from_io(&e)))?;

        let template = dest_dir.join(format!("{SOURCE_STEM}.%(ext)s"));
        let args = strategy.tool_args(address, &template);
        debug!(strategy = %strategy.name, "Running yt-dlp {}", args.join(" "));

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AttemptError::Failed(RawFailure::from_io(&e)))?;

        // Dropping the wait future kills the child.
        let output = tokio::select! {
            out = child.wait_with_output() => {
                out.map_err(|e| AttemptError::Failed(RawFailure::from_io(&e)))?
            }
            _ = tokio::time::sleep(strategy.attempt_timeout) => {
                warn!(
                    strategy = %strategy.name,
                    timeout_secs = strategy.attempt_timeout.as_secs(),
                    "yt-dlp attempt timed out, killing process"
                );
                return Err(AttemptError::Failed(RawFailure::timed_out()));
            }
            abort = control.aborted() => return Err(AttemptError::Aborted(abort)),
        };

        if !output.status.success() {
            let failure = RawFailure::from_output(output.status, &output.stderr);
            debug!(strategy = %strategy.name, "yt-dlp stderr: {}", failure.stderr);
            return Err(AttemptError::Failed(failure));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info = parse_after_move(&stdout);

        let reported = info
            .as_ref()
            .and_then(|i| i.filepath.as_deref())
            .map(PathBuf::from);
        let path = match reported {
            Some(path) if path.exists() => Some(path),
            _ => find_downloaded_file(dest_dir).await,
        };

        let Some(path) = path else {
            return Err(AttemptError::Failed(RawFailure::from_stderr(
                "yt-dlp exited successfully but no output file was found",
            )));
        };
        if file_size(&path).await == 0 {
            return Err(AttemptError::Failed(RawFailure::from_stderr(format!(
                "downloaded file is empty: {}",
                path.display()
            ))));
        }

        let (title, duration_secs, thumbnail) = match info {
            Some(i) => (i.title, i.duration, i.thumbnail),
            None => (None, None, None),
        };

        Ok(DownloadedMedia {
            path,
            title: title.unwrap_or_else(|| "video".to_string()),
            duration_secs,
            thumbnail,
        })
    }
}

/// Successful orchestration run.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub media: DownloadedMedia,
    pub attempts: Vec<DownloadAttempt>,
}

/// Terminal failure of an orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionFailure {
    /// Last classified kind
    pub kind: ErrorKind,
    pub scope: FailureScope,
    pub message: String,
    pub attempts: Vec<DownloadAttempt>,
}

impl AcquisitionFailure {
    fn new(
        kind: ErrorKind,
        scope: FailureScope,
        message: impl Into<String>,
        attempts: Vec<DownloadAttempt>,
    ) -> Self {
        Self {
            kind,
            scope,
            message: message.into(),
            attempts,
        }
    }

    fn aborted(abort: Abort, attempts: Vec<DownloadAttempt>) -> Self {
        match abort {
            Abort::DeadlineExceeded => Self::new(
                ErrorKind::Timeout,
                FailureScope::DeadlineExceeded,
                "job deadline exceeded during acquisition",
                attempts,
            ),
            Abort::Cancelled => Self::new(
                ErrorKind::Transient,
                FailureScope::Cancelled,
                "job cancelled during acquisition",
                attempts,
            ),
        }
    }

    pub fn into_job_failure(self) -> JobFailure {
        JobFailure::new(self.kind, self.scope, self.message).with_attempts(self.attempts)
    }
}

impl std::fmt::Display for AcquisitionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acquisition failed ({}, {:?}) after {} attempts: {}",
            self.kind,
            self.scope,
            self.attempts.len(),
            self.message
        )
    }
}

impl std::error::Error for AcquisitionFailure {}

/// How one strategy (or one alternative address) ended.
enum StrategyRun {
    Success(DownloadedMedia),
    Exhausted { kind: ErrorKind, message: String },
    ToolMissing(String),
    Aborted(Abort),
}

/// Sequential multi-strategy downloader.
pub struct StrategyOrchestrator<R> {
    retriever: R,
    registry: Arc<StrategyRegistry>,
    policy: RetryPolicy,
    try_alternatives: bool,
}

impl<R: Retriever> StrategyOrchestrator<R> {
    /// Orchestrator over the process-wide default registry.
    pub fn new(retriever: R) -> Self {
        Self::with_registry(retriever, StrategyRegistry::global())
    }

    pub fn with_registry(retriever: R, registry: Arc<StrategyRegistry>) -> Self {
        Self {
            retriever,
            registry,
            policy: RetryPolicy::default(),
            try_alternatives: true,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Skip the alternative-address pass.
    pub fn without_alternatives(mut self) -> Self {
        self.try_alternatives = false;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Resolve `address` into a local file under `dest_dir`.
    pub async fn acquire(
        &self,
        address: &str,
        dest_dir: &Path,
        control: &JobControl,
    ) -> Result<Acquisition, AcquisitionFailure> {
        let mut attempts = Vec::new();
        let mut last = (ErrorKind::Transient, "no strategy was attempted".to_string());

        info!(address, strategies = self.registry.len(), "Starting acquisition");

        for strategy in self.registry.iter() {
            let run = self
                .run_strategy(
                    strategy,
                    "primary",
                    address,
                    strategy.max_attempts,
                    dest_dir,
                    control,
                    &mut attempts,
                )
                .await;

            match run {
                StrategyRun::Success(media) => return Ok(Acquisition { media, attempts }),
                StrategyRun::Exhausted { kind, message } if kind.is_permanent() => {
                    warn!(strategy = %strategy.name, %kind, "Permanent failure, giving up");
                    return Err(AcquisitionFailure::new(
                        kind,
                        FailureScope::Permanent,
                        message,
                        attempts,
                    ));
                }
                StrategyRun::Exhausted { kind, message } => {
                    info!(strategy = %strategy.name, %kind, "Strategy exhausted, advancing");
                    last = (kind, message);
                }
                StrategyRun::ToolMissing(message) => {
                    return Err(AcquisitionFailure::new(
                        ErrorKind::ExecutionFailure,
                        FailureScope::Execution,
                        message,
                        attempts,
                    ));
                }
                StrategyRun::Aborted(abort) => {
                    return Err(AcquisitionFailure::aborted(abort, attempts));
                }
            }
        }

        let alternatives = if self.try_alternatives {
            alternative_address_forms(address)
        } else {
            Vec::new()
        };
        let fallback = match (alternatives.is_empty(), self.registry.last()) {
            (false, Some(strategy)) => strategy,
            _ => {
                let (kind, message) = last;
                return Err(AcquisitionFailure::new(
                    kind,
                    FailureScope::StrategiesExhausted,
                    message,
                    attempts,
                ));
            }
        };

        info!(
            strategy = %fallback.name,
            forms = alternatives.len(),
            "All strategies failed, trying alternative addresses"
        );

        for form in &alternatives {
            let run = self
                .run_strategy(
                    fallback,
                    form.label,
                    &form.address,
                    1,
                    dest_dir,
                    control,
                    &mut attempts,
                )
                .await;

            match run {
                StrategyRun::Success(media) => return Ok(Acquisition { media, attempts }),
                StrategyRun::Exhausted { kind, message } if kind.is_permanent() => {
                    return Err(AcquisitionFailure::new(
                        kind,
                        FailureScope::Permanent,
                        message,
                        attempts,
                    ));
                }
                StrategyRun::Exhausted { kind, message } => last = (kind, message),
                StrategyRun::ToolMissing(message) => {
                    return Err(AcquisitionFailure::new(
                        ErrorKind::ExecutionFailure,
                        FailureScope::Execution,
                        message,
                        attempts,
                    ));
                }
                StrategyRun::Aborted(abort) => {
                    return Err(AcquisitionFailure::aborted(abort, attempts));
                }
            }
        }

        let (kind, message) = last;
        warn!(%kind, attempts = attempts.len(), "All strategies and alternative addresses failed");
        Err(AcquisitionFailure::new(
            kind,
            FailureScope::AlternativesExhausted,
            message,
            attempts,
        ))
    }

    /// Attempt one strategy against one address until it succeeds, the
    /// retry policy says stop, or `max_attempts` is reached.
    #[allow(clippy::too_many_arguments)]
    async fn run_strategy(
        &self,
        strategy: &DownloadStrategy,
        form_label: &str,
        address: &str,
        max_attempts: u32,
        dest_dir: &Path,
        control: &JobControl,
        attempts: &mut Vec<DownloadAttempt>,
    ) -> StrategyRun {
        let cap = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if let Err(abort) = control.check() {
                return StrategyRun::Aborted(abort);
            }

            let started_at = Utc::now();
            info!(
                strategy = %strategy.name,
                attempt,
                address_form = form_label,
                address,
                "Attempting retrieval"
            );

            let result = self
                .retriever
                .retrieve(strategy, address, dest_dir, control)
                .await;

            let mut record = |outcome: AttemptOutcome| {
                metrics::record_download_attempt(&strategy.name, outcome.as_str());
                attempts.push(DownloadAttempt {
                    strategy: strategy.name.clone(),
                    address_form: form_label.to_string(),
                    address: address.to_string(),
                    attempt,
                    started_at,
                    outcome,
                });
            };

            let raw = match result {
                Ok(media) => {
                    record(AttemptOutcome::Succeeded);
                    info!(
                        strategy = %strategy.name,
                        attempt,
                        path = %media.path.display(),
                        "Retrieval succeeded"
                    );
                    return StrategyRun::Success(media);
                }
                Err(AttemptError::Aborted(abort)) => {
                    record(AttemptOutcome::Aborted);
                    remove_partial_downloads(dest_dir).await;
                    return StrategyRun::Aborted(abort);
                }
                Err(AttemptError::ToolMissing(message)) => {
                    record(AttemptOutcome::Failed {
                        kind: ErrorKind::ExecutionFailure,
                        message: message.clone(),
                    });
                    return StrategyRun::ToolMissing(message);
                }
                Err(AttemptError::Failed(raw)) => raw,
            };

            let kind = classify(&raw);
            let message = raw.summary();
            record(AttemptOutcome::Failed {
                kind,
                message: message.clone(),
            });
            remove_partial_downloads(dest_dir).await;

            warn!(
                strategy = %strategy.name,
                attempt,
                address_form = form_label,
                %kind,
                error = %message,
                "Retrieval attempt failed"
            );

            let decision = self.policy.decide(kind, attempt);
            if !decision.should_retry || attempt >= cap {
                return StrategyRun::Exhausted { kind, message };
            }

            metrics::record_download_retry(&strategy.name, kind);
            info!(
                strategy = %strategy.name,
                %kind,
                delay_secs = decision.delay_secs,
                "Backing off before retrying the same strategy"
            );
            if let Err(abort) = control.sleep(decision.delay()).await {
                return StrategyRun::Aborted(abort);
            }
            attempt += 1;
        }
    }
}
