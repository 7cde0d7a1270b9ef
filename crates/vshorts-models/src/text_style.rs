//! Text overlay styling presets for titles and subtitles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which overlay a style applies to. Size and placement differ per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextRole {
    Title,
    Subtitle,
}

impl TextRole {
    /// Vertical anchor as a fraction of frame height.
    pub fn position_y_ratio(&self) -> f64 {
        match self {
            TextRole::Title => 0.05,
            TextRole::Subtitle => 0.85,
        }
    }
}

/// Color presets. Each preset carries a contrasting border color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextColor {
    #[default]
    White,
    Red,
    Blue,
    Yellow,
    Green,
    Orange,
    Purple,
    Pink,
}

impl TextColor {
    /// Fill color as understood by FFmpeg's color parser.
    pub fn fill(&self) -> &'static str {
        match self {
            TextColor::White => "white",
            TextColor::Red => "red",
            TextColor::Blue => "0x0066FF",
            TextColor::Yellow => "yellow",
            TextColor::Green => "0x00FF66",
            TextColor::Orange => "orange",
            TextColor::Purple => "0x9966FF",
            TextColor::Pink => "0xFF66CC",
        }
    }

    pub fn border(&self) -> &'static str {
        match self {
            TextColor::Red | TextColor::Blue | TextColor::Purple => "white",
            _ => "black",
        }
    }
}

/// Size presets, expressed as a fraction of frame height per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TextSize {
    Small,
    #[default]
    Medium,
    Large,
    ExtraLarge,
}

impl TextSize {
    pub fn ratio(&self, role: TextRole) -> f64 {
        match (self, role) {
            (TextSize::Small, TextRole::Title) => 0.03,
            (TextSize::Medium, TextRole::Title) => 0.04,
            (TextSize::Large, TextRole::Title) => 0.05,
            (TextSize::ExtraLarge, TextRole::Title) => 0.06,
            (TextSize::Small, TextRole::Subtitle) => 0.04,
            (TextSize::Medium, TextRole::Subtitle) => 0.05,
            (TextSize::Large, TextRole::Subtitle) => 0.06,
            (TextSize::ExtraLarge, TextRole::Subtitle) => 0.07,
        }
    }
}

/// Style of a text overlay.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TextStyle {
    #[serde(default)]
    pub color: TextColor,

    #[serde(default)]
    pub size: TextSize,

    /// Font file; the composer falls back to its configured font when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_path: Option<String>,
}

/// Border width in pixels for both roles.
pub const TEXT_BORDER_WIDTH: u32 = 3;

impl TextStyle {
    pub fn new(color: TextColor, size: TextSize) -> Self {
        Self {
            color,
            size,
            font_path: None,
        }
    }

    pub fn with_font(mut self, font_path: impl Into<String>) -> Self {
        self.font_path = Some(font_path.into());
        self
    }

    /// Font size in pixels for a frame of the given height.
    pub fn font_size(&self, role: TextRole, frame_height: u32) -> u32 {
        (frame_height as f64 * self.size.ratio(role)) as u32
    }

    /// Top offset in pixels for a frame of the given height.
    pub fn y_position(&self, role: TextRole, frame_height: u32) -> u32 {
        (frame_height as f64 * role.position_y_ratio()) as u32
    }
}
