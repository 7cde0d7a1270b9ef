#![deny(unreachable_patterns)]
//! Source acquisition and composition for VShorts.
//!
//! This crate provides:
//! - Failure classification for the retrieval tool and the retry policy
//! - A priority-ordered strategy registry and the acquisition orchestrator
//! - Filter graph composition with a validated terminal stream
//! - Type-safe FFmpeg command building, progress parsing and cancellation
//! - Fragment cutting of the composed output

pub mod classify;
pub mod command;
pub mod control;
pub mod download;
pub mod error;
pub mod executor;
pub mod filter_graph;
pub mod fragments;
pub mod fs_utils;
pub mod metrics;
pub mod probe;
pub mod progress;
pub mod retry_policy;
pub mod strategy;

pub use classify::{classify, RawFailure};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use control::{Abort, JobControl};
pub use download::{
    Acquisition, AcquisitionFailure, AttemptError, Retriever, StrategyOrchestrator,
    YtDlpRetriever,
};
pub use error::{MediaError, MediaResult};
pub use executor::{EncodeSettings, ExecutionReport, PipelineExecutor};
pub use filter_graph::{
    compose, CompositionContext, PipelineDescription, Stage, StageKind, StreamNode,
    FALLBACK_FONT,
};
pub use fragments::cut_fragments;
pub use probe::{get_duration, probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use retry_policy::{decide, RetryPolicy};
pub use strategy::{default_strategies, DownloadStrategy, RetrievalMode, StrategyRegistry};
