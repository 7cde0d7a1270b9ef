//! Job runner: acquire, compose, execute, cut.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, Instrument};

use vshorts_media::fs_utils::{move_file, SOURCE_STEM};
use vshorts_media::{
    compose, cut_fragments, get_duration, probe_video, CompositionContext, FfmpegRunner,
    JobControl, MediaError, PipelineExecutor, Retriever, StrategyOrchestrator,
};
use vshorts_models::{DownloadedMedia, JobOutcome, JobRequest, OutputArtifact, SourceRef};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

const OPERATION: &str = "compose_short";
const COMPOSED_FILE: &str = "composed.mp4";

/// Runs one job at a time. Holds no per-job state, so one runner can be
/// shared by concurrent jobs.
pub struct JobRunner<R> {
    config: WorkerConfig,
    orchestrator: StrategyOrchestrator<R>,
    executor: PipelineExecutor,
    cancel: Option<watch::Receiver<bool>>,
}

impl<R: Retriever> JobRunner<R> {
    /// Runner over the process-wide strategy registry.
    pub fn new(config: WorkerConfig, retriever: R) -> Self {
        Self::with_orchestrator(config, StrategyOrchestrator::new(retriever))
    }

    pub fn with_orchestrator(config: WorkerConfig, orchestrator: StrategyOrchestrator<R>) -> Self {
        let executor = PipelineExecutor::new().with_timeout(config.pipeline_timeout);
        Self {
            config,
            orchestrator,
            executor,
            cancel: None,
        }
    }

    /// Cancel in-flight jobs when `cancel` flips to `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Job control for `request`: the earlier of the request deadline and the
    /// configured job timeout.
    pub fn control_for(&self, request: &JobRequest) -> JobControl {
        let mut budget = self.config.job_timeout;
        if let Some(deadline) = request.deadline {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            budget = budget.min(remaining);
        }
        let control = JobControl::unbounded().with_timeout(budget);
        match &self.cancel {
            Some(rx) => control.with_cancel(rx.clone()),
            None => control,
        }
    }

    /// Scratch directory of one job.
    pub fn work_dir_for(&self, request: &JobRequest) -> PathBuf {
        self.config.work_dir.join(request.job_id.as_str())
    }

    /// Run `request` to completion. Always returns an outcome; failures are
    /// reported in it, not as an error.
    pub async fn run(&self, request: JobRequest) -> JobOutcome {
        let logger = JobLogger::new(&request.job_id, OPERATION);
        let span = logger.create_span();
        self.run_logged(request, logger).instrument(span).await
    }

    async fn run_logged(&self, request: JobRequest, logger: JobLogger) -> JobOutcome {
        logger.log_start(&format!("source={}", request.source));

        let control = self.control_for(&request);
        let work_dir = self.work_dir_for(&request);
        let result = self.run_inner(&request, &control, &work_dir, &logger).await;

        if self.config.keep_intermediate {
            debug!(work_dir = %work_dir.display(), "Keeping intermediate files");
        } else if let Err(e) = fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                logger.log_warning(&format!("failed to remove {}: {}", work_dir.display(), e));
            }
        }

        let job_id = request.job_id;
        match result {
            Ok((media, artifact)) => {
                logger.log_completion(&format!("title={}", media.title));
                JobOutcome::Completed {
                    job_id,
                    media,
                    artifact,
                }
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let failure = e.into_job_failure();
                logger.log_error(&format!(
                    "kind={} scope={:?} retry={} {}",
                    failure.kind, failure.scope, retryable, failure.message
                ));
                JobOutcome::Failed { job_id, failure }
            }
        }
    }

    async fn run_inner(
        &self,
        request: &JobRequest,
        control: &JobControl,
        work_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<(DownloadedMedia, OutputArtifact)> {
        request.features.validate()?;
        control.check()?;
        fs::create_dir_all(work_dir).await?;

        let media = self.resolve_source(&request.source, work_dir, control, logger).await?;
        control.check()?;

        let ctx = CompositionContext::for_features(&request.features)
            .with_fonts(&self.config.title_font, &self.config.subtitle_font);
        let pipeline = compose(&request.features, &ctx);
        pipeline.validate()?;
        logger.log_progress(&format!(
            "composed {} stages, terminal {}",
            pipeline.stage_count(),
            pipeline.terminal()
        ));

        // Encode inside the work dir so the destination only ever sees a
        // complete file.
        let composed = work_dir.join(COMPOSED_FILE);
        self.executor
            .execute(&pipeline, &media.path, &composed, control)
            .await?;

        let Some(spec) = pipeline.fragments() else {
            move_file(&composed, &request.output_path).await?;
            let source_dest = single_source_path(&request.output_path, &media.path);
            let media = publish_source(media, work_dir, &source_dest).await?;
            let artifact = OutputArtifact::Single {
                path: request.output_path.clone(),
            };
            return Ok((media, artifact));
        };

        let total_secs = get_duration(&composed).await?;
        let cuts = pipeline.cut_list(total_secs);
        if cuts.is_empty() {
            return Err(MediaError::InvalidVideo(format!(
                "composed video of {total_secs:.1}s is too short for {}s fragments",
                spec.duration_secs
            ))
            .into());
        }
        logger.log_progress(&format!("cutting {} fragments", cuts.len()));

        let runner = FfmpegRunner::new()
            .with_control(control.clone())
            .with_timeout(self.config.cut_timeout);
        let fragments = cut_fragments(&composed, &cuts, &request.output_path, &runner).await?;

        let source_dest = request
            .output_path
            .join(source_file_name(SOURCE_STEM, &media.path));
        let media = publish_source(media, work_dir, &source_dest).await?;

        Ok((media, OutputArtifact::Fragments { fragments }))
    }

    async fn resolve_source(
        &self,
        source: &SourceRef,
        work_dir: &Path,
        control: &JobControl,
        logger: &JobLogger,
    ) -> WorkerResult<DownloadedMedia> {
        match source {
            SourceRef::Url { url } => {
                let acquisition = self.orchestrator.acquire(url, work_dir, control).await?;
                logger.log_progress(&format!(
                    "acquired '{}' after {} attempts",
                    acquisition.media.title,
                    acquisition.attempts.len()
                ));
                Ok(acquisition.media)
            }
            SourceRef::LocalFile { path } => {
                let info = probe_video(path).await?;
                let title = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                logger.log_progress(&format!(
                    "using local file {} ({}x{}, {:.1}s)",
                    path.display(),
                    info.width,
                    info.height,
                    info.duration
                ));
                Ok(DownloadedMedia {
                    path: path.clone(),
                    title,
                    duration_secs: Some(info.duration),
                    thumbnail: None,
                })
            }
        }
    }
}

/// Hand a downloaded source over to the caller by moving it out of the work
/// dir, which is removed after the job. Sources outside the work dir (local
/// uploads) already belong to the caller and stay where they are.
async fn publish_source(
    mut media: DownloadedMedia,
    work_dir: &Path,
    dest: &Path,
) -> WorkerResult<DownloadedMedia> {
    let source = fs::canonicalize(&media.path).await.unwrap_or_else(|_| media.path.clone());
    let work_dir = fs::canonicalize(work_dir).await.unwrap_or_else(|_| work_dir.to_path_buf());
    if !source.starts_with(&work_dir) {
        return Ok(media);
    }
    move_file(&media.path, dest).await?;
    debug!(from = %media.path.display(), to = %dest.display(), "Published source media");
    media.path = dest.to_path_buf();
    Ok(media)
}

/// `<output stem>.source.<ext>` next to a single output file.
fn single_source_path(output: &Path, source: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| SOURCE_STEM.to_string());
    output.with_file_name(source_file_name(&format!("{stem}.{SOURCE_STEM}"), source))
}

fn source_file_name(stem: &str, source: &Path) -> String {
    match source.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
        None => stem.to_string(),
    }
}
