//! Runtime layer for Clickstream Prep.
//!
//! Fans the per-user pipeline out over a bounded pool of tokio tasks, writes
//! each user's output and collects the run summary.

pub mod orchestrator;

pub use clickstream_core as core;
pub use clickstream_data as data;
