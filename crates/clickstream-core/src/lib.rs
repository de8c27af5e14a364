//! Shared types for the clickstream preparation pipeline.
//!
//! Holds the event and record models, module-key parsing, the
//! course-structure lookup table, payload and timestamp processors, and the
//! configuration layer used by every other crate in the workspace.

pub mod config;
pub mod data_processors;
pub mod error;
pub mod models;
pub mod module_key;
pub mod settings;
pub mod structure;

pub use error::{PrepError, Result};
