//! Per-user preparation layer for Clickstream Prep.
//!
//! Reads raw tracking-log rows and the course structure, orders and segments
//! each user's events, filters them by category, resolves them to content
//! modules and writes the per-user output files.

pub mod assembler;
pub mod classifier;
pub mod event_types;
pub mod normalizer;
pub mod pipeline;
pub mod reader;
pub mod resolver;
pub mod segmenter;

pub use clickstream_core as core;
