//! FFmpeg progress parsing and diagnostic capture.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Progress information from FFmpeg's `-progress pipe:2` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

/// Fold one `key=value` progress line into `current`.
///
/// Returns a snapshot at the end of each progress block, `None` otherwise.
/// Lines that are not progress keys return `None` and leave `current` alone.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            // FFmpeg reports microseconds under both keys
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

const PROGRESS_KEYS: &[&str] = &[
    "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us", "out_time_ms",
    "out_time", "dup_frames", "drop_frames", "speed", "progress",
];

/// Whether a stderr line belongs to the `-progress` stream rather than to
/// FFmpeg's own log.
pub fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(key, _)| PROGRESS_KEYS.contains(&key.trim()) || key.starts_with("stream_"))
}

/// Bounded tail of a tool's diagnostic output.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(DiagnosticTail::DEFAULT_CAPACITY)
    }
}

impl DiagnosticTail {
    pub const DEFAULT_CAPACITY: usize = 30;

    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}
