//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::control::JobControl;
use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, DiagnosticTail, FfmpegProgress};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek position (input side, fast).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit the input duration read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    pub fn filter_complex(self, graph: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(graph)
    }

    /// Map a stream label or input stream specifier to the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Copy every mapped stream without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn audio_sample_rate(self, hz: u32) -> Self {
        self.output_arg("-ar").output_arg(hz.to_string())
    }

    pub fn audio_channels(self, channels: u8) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with a wall-clock timeout and job control.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    control: JobControl,
    timeout: Option<Duration>,
}

enum Finished {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Aborted(crate::control::Abort),
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_control(mut self, control: JobControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn control(&self) -> &JobControl {
        &self.control
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command, reporting each progress block to `on_progress`.
    ///
    /// Non-progress stderr lines are logged at debug level and the last few
    /// are attached to the error on failure.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;
        self.control.check()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut progress = FfmpegProgress::default();
            let mut tail = DiagnosticTail::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = parse_progress_line(&line, &mut progress) {
                        on_progress(snapshot);
                    }
                } else if !line.trim().is_empty() {
                    debug!(target: "vshorts::ffmpeg", "{}", line);
                    tail.push(line);
                }
            }
            tail
        });

        let finished = tokio::select! {
            status = child.wait() => Finished::Exited(status),
            _ = sleep_or_forever(self.timeout) => Finished::TimedOut,
            abort = self.control.aborted() => Finished::Aborted(abort),
        };

        let result = match finished {
            Finished::Exited(status) => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(status.code())
                }
            }
            Finished::TimedOut => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                return Err(MediaError::Timeout(secs));
            }
            Finished::Aborted(abort) => {
                info!(?abort, "FFmpeg aborted, killing process");
                let _ = child.kill().await;
                return Err(abort.into());
            }
        };

        let tail = reader.await.unwrap_or_default();
        result.map_err(|exit_code| {
            let message = tail
                .last()
                .map(str::to_string)
                .unwrap_or_else(|| "FFmpeg exited with non-zero status".to_string());
            MediaError::ffmpeg_failed(message, Some(tail.render()), exit_code)
        })
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending().await,
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Check if yt-dlp is available.
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}
