//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// What the worker needs to know about a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// File size in bytes
    pub size: u64,
    /// Bitrate in bits/second
    pub bitrate: u64,
    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
}

impl VideoInfo {
    /// Landscape sources are what the layouts are built for; portrait input
    /// is still accepted.
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let ffprobe = check_ffprobe()?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed on {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    Ok(probe_video(path).await?.duration)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_deref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        codec: video.codec_name.clone().unwrap_or_default(),
        size,
        bitrate,
        has_audio,
    })
}

/// Parse a frame rate such as "30/1" or "29.97". "0/0" yields `None`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "format": {"duration": "125.480000", "size": "1048576", "bit_rate": "800000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "r_frame_rate": "30/1", "avg_frame_rate": "0/0"},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 125.48).abs() < 1e-6);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps - 30.0).abs() < 0.01);
        assert_eq!(info.codec, "h264");
        assert_eq!(info.size, 1_048_576);
        assert_eq!(info.bitrate, 800_000);
        assert!(info.has_audio);
        assert!(!info.is_portrait());
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_video("/nonexistent/source.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
