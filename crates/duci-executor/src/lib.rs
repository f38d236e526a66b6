//! Job execution engine for the duci CI runner.
//!
//! Provides:
//! - Build context packaging and Dockerfile resolution
//! - A Docker implementation of the container runtime seam
//! - The process-wide concurrency gate
//! - The job executor driving one build-and-run under a deadline

pub mod context;
pub mod docker;
pub mod executor;
pub mod gate;

pub use context::{build_context, dockerfile_path};
pub use docker::DockerRuntime;
pub use executor::{ExecutorSettings, JobExecutor};
pub use gate::{ConcurrencyGate, GateSlot};

pub use duci_core::runtime::{ContainerRuntime, RuntimeLog};
