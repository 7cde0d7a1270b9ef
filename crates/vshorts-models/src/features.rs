//! Job-supplied composition features.
//!
//! A [`FeatureSet`] is read-only input to the filter graph composer. It says
//! which optional stages (title, subtitle burn) are wanted, how the frame is
//! laid out, at which quality, and whether the result is cut into fragments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::fragment::FragmentSpec;
use crate::text_style::TextStyle;

/// Title drawn near the top of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TitleOverlay {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl TitleOverlay {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::default(),
        }
    }
}

/// A single timed subtitle segment. Times are seconds into the composed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Split the cue into one timed segment per word, each word getting an
    /// equal share of the cue's duration.
    pub fn words(&self) -> Vec<SubtitleCue> {
        let words: Vec<&str> = self.text.split_whitespace().collect();
        if words.is_empty() || self.end <= self.start {
            return Vec::new();
        }
        let step = (self.end - self.start) / words.len() as f64;
        words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let start = self.start + i as f64 * step;
                SubtitleCue::new(start, start + step, *word)
            })
            .collect()
    }
}

/// Subtitle source to burn into the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubtitleTrack {
    /// An SRT/ASS file rendered by FFmpeg's `subtitles` filter
    File {
        path: PathBuf,
        #[serde(default)]
        style: TextStyle,
    },
    /// Timed cues rendered word by word with `drawtext`
    Cues {
        cues: Vec<SubtitleCue>,
        #[serde(default)]
        style: TextStyle,
    },
}

impl SubtitleTrack {
    pub fn style(&self) -> &TextStyle {
        match self {
            SubtitleTrack::File { style, .. } | SubtitleTrack::Cues { style, .. } => style,
        }
    }

    /// Whether burning this track would draw anything at all.
    pub fn is_renderable(&self) -> bool {
        match self {
            SubtitleTrack::File { path, .. } => !path.as_os_str().is_empty(),
            SubtitleTrack::Cues { cues, .. } => cues.iter().any(|c| !c.words().is_empty()),
        }
    }
}

/// Base frame composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Blurred full-frame background with the source centred on top
    #[default]
    BlurredBackground,
    /// Crop the centre 9:16 slice and scale it to fill the frame
    CenterCrop,
    /// Fit the source inside the frame and pad with black bars
    Letterbox,
}

/// Output resolution preset (portrait).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputQuality {
    #[serde(rename = "720p")]
    Hd720,
    #[default]
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    Uhd4k,
}

/// Frame rate of every composed output.
pub const OUTPUT_FPS: u32 = 30;

impl OutputQuality {
    /// Output (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            OutputQuality::Hd720 => (720, 1280),
            OutputQuality::FullHd => (1080, 1920),
            OutputQuality::Uhd4k => (2160, 3840),
        }
    }
}

/// Invalid feature combinations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureSetError {
    #[error("fragment duration {0}s is outside {min}..={max}s", min = FragmentSpec::MIN_SECS, max = FragmentSpec::MAX_SECS)]
    FragmentDuration(u32),

    #[error("subtitle cue {index} ends before it starts")]
    CueOrder { index: usize },
}

/// Everything the composer needs to know about a job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FeatureSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<TitleOverlay>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<SubtitleTrack>,

    #[serde(default)]
    pub layout: LayoutMode,

    #[serde(default)]
    pub quality: OutputQuality,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragments: Option<FragmentSpec>,
}

impl FeatureSet {
    pub fn with_title(mut self, title: TitleOverlay) -> Self {
        self.title = Some(title);
        self
    }

    pub fn with_subtitles(mut self, subtitles: SubtitleTrack) -> Self {
        self.subtitles = Some(subtitles);
        self
    }

    pub fn with_layout(mut self, layout: LayoutMode) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_quality(mut self, quality: OutputQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_fragments(mut self, spec: FragmentSpec) -> Self {
        self.fragments = Some(spec);
        self
    }

    /// A title stage is included only for non-blank text.
    pub fn has_title(&self) -> bool {
        self.title
            .as_ref()
            .is_some_and(|t| !t.text.trim().is_empty())
    }

    /// A subtitle stage is included only when the track draws something.
    pub fn has_subtitles(&self) -> bool {
        self.subtitles.as_ref().is_some_and(|s| s.is_renderable())
    }

    /// Validate the combination before any work is scheduled.
    pub fn validate(&self) -> Result<(), FeatureSetError> {
        if let Some(spec) = &self.fragments {
            spec.validate()?;
        }
        if let Some(SubtitleTrack::Cues { cues, .. }) = &self.subtitles {
            if let Some(index) = cues.iter().position(|c| c.end < c.start) {
                return Err(FeatureSetError::CueOrder { index });
            }
        }
        Ok(())
    }
}
