//! Ranking pipeline.
//!
//! This module provides:
//! - [`Pipeline`]: Canonical-order filtering, per-channel ranking and final ordering

pub mod orchestrator;

pub use orchestrator::{Pipeline, PipelineConfig, PipelineOutput};
