//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vshorts_media::FALLBACK_FONT;

use crate::error::{WorkerError, WorkerResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "" => Ok(LogFormat::Text),
            other => Err(WorkerError::config_error(format!("unknown LOG_FORMAT '{other}'"))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Hard limit on one job, acquisition through cutting
    pub job_timeout: Duration,
    /// Limit on one transcoder run
    pub pipeline_timeout: Duration,
    /// Limit on cutting one fragment
    pub cut_timeout: Duration,
    pub title_font: String,
    pub subtitle_font: String,
    /// Leave the job scratch directory in place after the job
    pub keep_intermediate: bool,
    pub log_format: LogFormat,
    /// Prometheus listener; metrics are not exported when unset
    pub metrics_listen_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/vshorts"),
            job_timeout: Duration::from_secs(14400), // 4 hours
            pipeline_timeout: Duration::from_secs(1200),
            cut_timeout: Duration::from_secs(300),
            title_font: FALLBACK_FONT.to_string(),
            subtitle_font: FALLBACK_FONT.to_string(),
            keep_intermediate: false,
            log_format: LogFormat::Text,
            metrics_listen_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Unparseable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            work_dir: lookup("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_timeout: secs("WORKER_JOB_TIMEOUT", defaults.job_timeout),
            pipeline_timeout: secs("WORKER_PIPELINE_TIMEOUT", defaults.pipeline_timeout),
            cut_timeout: secs("WORKER_CUT_TIMEOUT", defaults.cut_timeout),
            title_font: lookup("WORKER_TITLE_FONT").unwrap_or(defaults.title_font),
            subtitle_font: lookup("WORKER_SUBTITLE_FONT").unwrap_or(defaults.subtitle_font),
            keep_intermediate: lookup("WORKER_KEEP_INTERMEDIATE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.keep_intermediate),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
            metrics_listen_addr: lookup("METRICS_LISTEN_ADDR").and_then(|s| s.parse().ok()),
        }
    }

    /// Reject settings that would make every job fail.
    pub fn validate(&self) -> WorkerResult<()> {
        for (name, value) in [
            ("WORKER_JOB_TIMEOUT", self.job_timeout),
            ("WORKER_PIPELINE_TIMEOUT", self.pipeline_timeout),
            ("WORKER_CUT_TIMEOUT", self.cut_timeout),
        ] {
            if value.is_zero() {
                return Err(WorkerError::config_error(format!("{name} must be positive")));
            }
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(WorkerError::config_error("WORKER_WORK_DIR is empty"));
        }
        Ok(())
    }
}
