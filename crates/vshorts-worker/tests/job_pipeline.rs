//! End-to-end job runs through a scripted retriever.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::watch;

use vshorts_media::{
    AttemptError, DownloadStrategy, JobControl, RawFailure, RetrievalMode, Retriever,
    StrategyOrchestrator, StrategyRegistry,
};
use vshorts_models::{
    DownloadedMedia, ErrorKind, FailureScope, FeatureSet, FragmentSpec, JobOutcome, JobRequest,
    SourceRef, TitleOverlay,
};
use vshorts_worker::{JobRunner, WorkerConfig};

const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
const PRIVATE: &str = "ERROR: [youtube] dQw4w9WgXcQ: Private video. Sign in if you've been granted access";
const BOT: &str = "ERROR: [youtube] dQw4w9WgXcQ: Sign in to confirm you're not a bot";

enum Step {
    Fail(&'static str),
    /// Write a file into the destination directory and report it
    Download(&'static [u8]),
}

struct ScriptedRetriever {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: Mutex::default(),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn retrieve(
        &self,
        strategy: &DownloadStrategy,
        _address: &str,
        dest_dir: &Path,
        _control: &JobControl,
    ) -> Result<DownloadedMedia, AttemptError> {
        self.calls.lock().unwrap().push(strategy.name.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Download(bytes)) => {
                let path = dest_dir.join("source.mp4");
                std::fs::write(&path, bytes).unwrap();
                Ok(DownloadedMedia {
                    path,
                    title: "Scripted".into(),
                    duration_secs: Some(75.0),
                    thumbnail: None,
                })
            }
            Some(Step::Fail(stderr)) => Err(AttemptError::Failed(RawFailure::from_stderr(stderr))),
            None => Err(AttemptError::Failed(RawFailure::from_stderr("ERROR: script exhausted"))),
        }
    }
}

fn registry(names: &[&str]) -> Arc<StrategyRegistry> {
    let strategies = names
        .iter()
        .enumerate()
        .map(|(i, n)| DownloadStrategy::new(*n, (i as u32 + 1) * 10, RetrievalMode::Web))
        .collect();
    Arc::new(StrategyRegistry::new(strategies).unwrap())
}

fn config(dir: &TempDir) -> WorkerConfig {
    WorkerConfig {
        work_dir: dir.path().join("work"),
        ..WorkerConfig::default()
    }
}

fn runner(dir: &TempDir, retriever: Arc<ScriptedRetriever>) -> JobRunner<Arc<ScriptedRetriever>> {
    let orchestrator =
        StrategyOrchestrator::with_registry(retriever, registry(&["desktop_web", "mobile_web"]))
            .without_alternatives();
    JobRunner::with_orchestrator(config(dir), orchestrator)
}

fn url_request(dir: &TempDir) -> JobRequest {
    JobRequest::new(
        SourceRef::Url { url: URL.into() },
        dir.path().join("out").join("short.mp4"),
    )
}

fn failure(outcome: &JobOutcome) -> &vshorts_models::JobFailure {
    outcome.failure().expect("job should have failed")
}

#[tokio::test]
async fn private_video_fails_immediately_without_retry() {
    let dir = TempDir::new().unwrap();
    let retriever = ScriptedRetriever::new(vec![Step::Fail(PRIVATE)]);
    let runner = runner(&dir, Arc::clone(&retriever));
    let request = url_request(&dir);
    let work_dir = runner.work_dir_for(&request);

    let outcome = runner.run(request).await;

    let failure = failure(&outcome);
    assert_eq!(failure.kind, ErrorKind::Private);
    assert_eq!(failure.scope, FailureScope::Permanent);
    assert!(!failure.should_retry_job());
    assert_eq!(failure.user_message(), "The video is private.");
    assert_eq!(failure.attempts.len(), 1);
    assert_eq!(retriever.calls(), vec!["desktop_web"]);
    assert!(!work_dir.exists());
}

#[tokio::test(start_paused = true)]
async fn bot_detection_exhausts_strategies_and_schedules_retry() {
    let dir = TempDir::new().unwrap();
    let retriever = ScriptedRetriever::new(vec![
        Step::Fail(BOT),
        Step::Fail(BOT),
        Step::Fail(BOT),
        Step::Fail(BOT),
    ]);
    let runner = runner(&dir, Arc::clone(&retriever));

    let outcome = runner.run(url_request(&dir)).await;

    let failure = failure(&outcome);
    assert_eq!(failure.kind, ErrorKind::BotDetection);
    assert_eq!(failure.scope, FailureScope::StrategiesExhausted);
    assert!(failure.should_retry_job());
    assert!(failure.user_message().contains("automatic retry"));
    assert_eq!(
        retriever.calls(),
        vec!["desktop_web", "desktop_web", "mobile_web", "mobile_web"]
    );
}

#[tokio::test]
async fn expired_deadline_stops_before_acquisition() {
    let dir = TempDir::new().unwrap();
    let retriever = ScriptedRetriever::new(vec![]);
    let runner = runner(&dir, Arc::clone(&retriever));
    let request = url_request(&dir).with_deadline(Utc::now() - chrono::Duration::seconds(1));

    let outcome = runner.run(request).await;

    let failure = failure(&outcome);
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.scope, FailureScope::DeadlineExceeded);
    assert!(!failure.should_retry_job());
    assert!(retriever.calls().is_empty());
}

#[tokio::test]
async fn cancellation_is_reported_as_cancelled() {
    let dir = TempDir::new().unwrap();
    let retriever = ScriptedRetriever::new(vec![]);
    let (tx, rx) = watch::channel(false);
    let runner = runner(&dir, Arc::clone(&retriever)).with_cancel(rx);
    tx.send(true).unwrap();

    let outcome = runner.run(url_request(&dir)).await;

    assert_eq!(failure(&outcome).scope, FailureScope::Cancelled);
    assert!(retriever.calls().is_empty());
}

#[tokio::test]
async fn invalid_fragment_duration_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let retriever = ScriptedRetriever::new(vec![]);
    let runner = runner(&dir, Arc::clone(&retriever));
    let request = url_request(&dir)
        .with_features(FeatureSet::default().with_fragments(FragmentSpec::new(5)));

    let outcome = runner.run(request).await;

    let failure = failure(&outcome);
    assert_eq!(failure.kind, ErrorKind::ExecutionFailure);
    assert!(!failure.should_retry_job());
    assert!(retriever.calls().is_empty());
}

#[tokio::test]
async fn missing_local_file_is_an_execution_failure() {
    let dir = TempDir::new().unwrap();
    let runner = runner(&dir, ScriptedRetriever::new(vec![]));
    let request = JobRequest::new(
        SourceRef::LocalFile {
            path: PathBuf::from("/nonexistent/upload.mp4"),
        },
        dir.path().join("short.mp4"),
    );

    let outcome = runner.run(request).await;

    let failure = failure(&outcome);
    assert_eq!(failure.kind, ErrorKind::ExecutionFailure);
    assert_eq!(failure.scope, FailureScope::Execution);
}

#[tokio::test]
async fn broken_download_fails_in_execution_and_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let retriever = ScriptedRetriever::new(vec![Step::Download(b"definitely not a video")]);
    let runner = runner(&dir, Arc::clone(&retriever));
    let request = url_request(&dir)
        .with_features(FeatureSet::default().with_title(TitleOverlay::new("Episode 1")));
    let output = request.output_path.clone();

    let outcome = tokio::time::timeout(Duration::from_secs(120), runner.run(request))
        .await
        .unwrap();

    // FFmpeg rejects the input (Transient) or is not installed (ExecutionFailure)
    let failure = failure(&outcome);
    assert_eq!(failure.scope, FailureScope::Execution);
    assert!(matches!(
        failure.kind,
        ErrorKind::Transient | ErrorKind::ExecutionFailure
    ));
    assert!(!output.exists());
    assert_eq!(retriever.calls(), vec!["desktop_web"]);
}

#[tokio::test]
async fn outcome_serializes_for_the_queue_layer() {
    let dir = TempDir::new().unwrap();
    let runner = runner(&dir, ScriptedRetriever::new(vec![Step::Fail(PRIVATE)]));

    let outcome = runner.run(url_request(&dir)).await;
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["status"], "failed");
    assert_eq!(json["failure"]["kind"], "private");
    assert_eq!(json["failure"]["scope"], "permanent");
}
