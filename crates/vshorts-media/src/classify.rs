//! Error classification for retrieval failures.
//!
//! Maps whatever a failed attempt left behind (exit code, stderr, a spawn
//! error, a timeout flag) onto an [`ErrorKind`]. Classification never fails:
//! unrecognized input is [`ErrorKind::Transient`].

use std::process::ExitStatus;
use vshorts_models::ErrorKind;

/// Raw evidence from one failed retrieval attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFailure {
    pub exit_code: Option<i32>,
    pub stderr: String,
    /// The attempt was killed by our own wall-clock timeout
    pub timed_out: bool,
    /// The process could not be spawned or read
    pub io_error: Option<String>,
}

impl RawFailure {
    pub fn from_output(status: ExitStatus, stderr: &[u8]) -> Self {
        Self {
            exit_code: status.code(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
            ..Default::default()
        }
    }

    pub fn from_stderr(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        Self {
            io_error: Some(err.to_string()),
            ..Default::default()
        }
    }

    /// Most useful single line for logs: the last `ERROR:` line, else the
    /// last non-empty line.
    pub fn summary(&self) -> String {
        if self.timed_out {
            return "attempt timed out".to_string();
        }
        if let Some(io) = &self.io_error {
            return io.clone();
        }
        let lines = self.stderr.lines().map(str::trim).filter(|l| !l.is_empty());
        lines
            .clone()
            .filter(|l| l.starts_with("ERROR:"))
            .last()
            .or_else(|| lines.last())
            .map(str::to_string)
            .unwrap_or_else(|| match self.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "unknown error".to_string(),
            })
    }
}

const PRIVATE: &[&str] = &["private video", "video is private"];

const REMOVED: &[&str] = &[
    "video has been removed",
    "video was deleted",
    "has been terminated",
    "account associated with this video has been terminated",
    "removed by the uploader",
    "copyright claim",
];

const AGE_RESTRICTED: &[&str] = &[
    "age-restricted",
    "age restricted",
    "age restriction",
    "confirm your age",
    "age verification",
    "inappropriate for some users",
];

const UNAVAILABLE: &[&str] = &[
    "video unavailable",
    "video is unavailable",
    "video not available",
    "available in your country",
    "blocked in your country",
    "premieres in",
    "premiere will begin",
    "this live event will begin",
    "is not a valid url",
    "unsupported url",
];

const BOT_DETECTION: &[&str] = &[
    "sign in to confirm",
    "not a bot",
    "captcha",
    "unusual traffic",
];

/// Throttle notices that reuse the wording of a permanent block.
const THROTTLED: &[&str] = &[
    "try again later",
    "content isn't available",
    "content is not available",
];

const RATE_LIMITED: &[&str] = &[
    "http error 429",
    "error 429",
    "429:",
    "too many requests",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "throttl",
];

const TIMEOUT: &[&str] = &["timed out", "timeout", "read operation timed out"];

fn any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classify a raw failure. Total and side-effect free.
pub fn classify(failure: &RawFailure) -> ErrorKind {
    if failure.timed_out {
        return ErrorKind::Timeout;
    }

    let mut text = failure.stderr.to_lowercase();
    if let Some(io) = &failure.io_error {
        text.push('\n');
        text.push_str(&io.to_lowercase());
    }

    if any(&text, PRIVATE) {
        return ErrorKind::Private;
    }
    if any(&text, REMOVED) || (text.contains("copyright") && text.contains("block")) {
        return ErrorKind::Removed;
    }
    if any(&text, THROTTLED) {
        return ErrorKind::RateLimited;
    }
    if any(&text, AGE_RESTRICTED) || any(&text, UNAVAILABLE) {
        return ErrorKind::Unavailable;
    }
    if any(&text, BOT_DETECTION) {
        return ErrorKind::BotDetection;
    }
    if any(&text, RATE_LIMITED) {
        return ErrorKind::RateLimited;
    }
    if any(&text, TIMEOUT) {
        return ErrorKind::Timeout;
    }
    ErrorKind::Transient
}
