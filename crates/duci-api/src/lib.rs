//! HTTP server for the duci CI runner.
//!
//! Accepts job triggers, streams job logs and reports commit statuses.

pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use state::AppState;
