//! Core domain types and traits for the duci CI runner.
//!
//! This crate contains:
//! - Job identifiers, log lines and the persisted job record
//! - The container runtime seam the executor drives
//! - Lifecycle observers and the per-job execution context
//! - Commit status vocabulary

pub mod context;
pub mod error;
pub mod id;
pub mod job;
pub mod observer;
pub mod runtime;
pub mod status;

pub use context::{CommitRef, JobContext};
pub use error::{Error, Result};
pub use id::JobId;
pub use job::{Job, LogLine, Outcome};
pub use observer::{JobObserver, ObserverSet};
pub use runtime::{ContainerId, ContainerRuntime, ExitCode, RuntimeLog, RuntimeOptions, Tag};
