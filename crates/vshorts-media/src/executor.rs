//! Pipeline execution.
//!
//! Runs one composed [`PipelineDescription`] through FFmpeg. The graph is
//! validated before a process is spawned, the resolved terminal stream is
//! mapped as the output video, and the run is bounded by both a per-run
//! timeout and the job's [`JobControl`]. Failures are returned, never
//! retried here.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, warn};

use vshorts_models::OUTPUT_FPS;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::control::JobControl;
use crate::error::{MediaError, MediaResult};
use crate::filter_graph::PipelineDescription;
use crate::fs_utils::{file_size, remove_if_exists};
use crate::metrics::record_pipeline_run;

/// Encoder settings for composed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub fps: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 20,
            fps: OUTPUT_FPS,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            audio_sample_rate: 44100,
            audio_channels: 2,
        }
    }
}

/// A finished pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub output: PathBuf,
    pub size_bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineExecutor {
    encode: EncodeSettings,
    timeout: Option<Duration>,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock limit for a single run, independent of the job deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_encode(mut self, encode: EncodeSettings) -> Self {
        self.encode = encode;
        self
    }

    pub fn encode(&self) -> &EncodeSettings {
        &self.encode
    }

    /// Build the FFmpeg invocation for `pipeline`. Fails with
    /// [`MediaError::CompositionInvariant`] if the graph is inconsistent.
    pub fn build_command(
        &self,
        pipeline: &PipelineDescription,
        input: &Path,
        output: &Path,
    ) -> MediaResult<FfmpegCommand> {
        pipeline.validate()?;

        let e = &self.encode;
        Ok(FfmpegCommand::new(input, output)
            .filter_complex(pipeline.filter_complex())
            .map(pipeline.terminal().label())
            .map("0:a?")
            .video_codec(&e.video_codec)
            .preset(&e.preset)
            .crf(e.crf)
            .frame_rate(e.fps)
            .audio_codec(&e.audio_codec)
            .audio_bitrate(&e.audio_bitrate)
            .audio_sample_rate(e.audio_sample_rate)
            .audio_channels(e.audio_channels)
            .faststart())
    }

    /// Run `pipeline` over `input`, writing `output`.
    ///
    /// A partially written output is removed on every failure path.
    pub async fn execute(
        &self,
        pipeline: &PipelineDescription,
        input: &Path,
        output: &Path,
        control: &JobControl,
    ) -> MediaResult<ExecutionReport> {
        let cmd = match self.build_command(pipeline, input, output) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(error = %e, "Refusing to execute inconsistent filter graph");
                record_pipeline_run("rejected", 0.0);
                return Err(e);
            }
        };

        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut runner = FfmpegRunner::new().with_control(control.clone());
        if let Some(timeout) = self.timeout {
            runner = runner.with_timeout(timeout);
        }

        info!(
            input = %input.display(),
            output = %output.display(),
            stages = pipeline.stage_count(),
            terminal = %pipeline.terminal(),
            "Executing composition pipeline"
        );

        let started = Instant::now();
        let result = runner
            .run_with_progress(&cmd, |progress| {
                debug!(
                    out_time_ms = progress.out_time_ms,
                    fps = progress.fps,
                    speed = progress.speed,
                    "Pipeline progress"
                );
            })
            .await;
        let elapsed = started.elapsed();

        if let Err(e) = result {
            remove_if_exists(output).await;
            record_pipeline_run(failure_outcome(&e), elapsed.as_secs_f64());
            warn!(
                kind = e.kind().as_str(),
                elapsed_secs = elapsed.as_secs_f64(),
                "Pipeline failed: {}",
                e
            );
            return Err(e);
        }

        let size_bytes = file_size(output).await;
        if size_bytes == 0 {
            remove_if_exists(output).await;
            record_pipeline_run("failed", elapsed.as_secs_f64());
            return Err(MediaError::FileNotFound(output.to_path_buf()));
        }

        record_pipeline_run("succeeded", elapsed.as_secs_f64());
        info!(
            output = %output.display(),
            size_bytes,
            elapsed_secs = elapsed.as_secs_f64(),
            "Pipeline finished"
        );

        Ok(ExecutionReport {
            output: output.to_path_buf(),
            size_bytes,
            elapsed,
        })
    }
}

fn failure_outcome(e: &MediaError) -> &'static str {
    match e {
        MediaError::Timeout(_) | MediaError::DeadlineExceeded => "timeout",
        MediaError::Cancelled => "cancelled",
        _ => "failed",
    }
}
