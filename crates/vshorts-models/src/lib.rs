//! Shared data models for the VShorts engine.
//!
//! This crate provides Serde-serializable types for:
//! - Job requests and outcomes exchanged with the task-queue layer
//! - The failure taxonomy and retry decisions
//! - Composition features (title, subtitles, layout, quality, fragments)
//! - Alternative address forms for remote sources

pub mod address;
pub mod error_kind;
pub mod features;
pub mod fragment;
pub mod job;
pub mod text_style;

// Re-export common types
pub use address::{alternative_address_forms, extract_youtube_id, AddressForm, YoutubeIdError};
pub use error_kind::{ErrorKind, RetryDecision};
pub use features::{
    FeatureSet, FeatureSetError, LayoutMode, OutputQuality, SubtitleCue, SubtitleTrack,
    TitleOverlay, OUTPUT_FPS,
};
pub use fragment::{Cut, CutList, Fragment, FragmentSpec};
pub use job::{
    AttemptOutcome, DownloadAttempt, DownloadedMedia, FailureScope, JobFailure, JobId,
    JobOutcome, JobRequest, OutputArtifact, SourceRef,
};
pub use text_style::{TextColor, TextRole, TextSize, TextStyle, TEXT_BORDER_WIDTH};
