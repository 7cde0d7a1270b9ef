//! VShorts job worker.
//!
//! This crate provides:
//! - The job runner: source acquisition, composition, execution, fragment cutting
//! - Environment-driven configuration
//! - Tracing and metrics bootstrap for the binaries

pub mod config;
pub mod error;
pub mod job;
pub mod logging;

pub use config::{LogFormat, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use job::JobRunner;
pub use logging::{init_metrics, init_tracing, JobLogger};
