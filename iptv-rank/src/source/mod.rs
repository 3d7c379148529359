//! Channel sources.
//!
//! This module provides:
//! - [`SourceFetcher`]: Fetching channel lists and the canonical order
//! - [`prepare_inputs`]: Normalization, dedup and early filtering

pub mod fetch;
pub mod prepare;

pub use fetch::{SourceError, SourceFetcher};
pub use prepare::{prepare_inputs, PrepareOptions};
