//! Stream probing and ranking.
//!
//! This module provides:
//! - [`QualityScorer`]: Keyword-based URL quality score
//! - [`MediaProbe`]: External stream sampling (default: `ffmpeg`)
//! - [`StreamProber`]: One URL to one result, with loopback shortcut and timeout
//! - [`ChannelProberPool`]: Concurrent probing and top-K ranking per channel

pub mod media_probe;
pub mod pool;
pub mod prober;
pub mod quality_scorer;

pub use media_probe::{CommandProbe, MediaProbe, ProbeOutcome};
pub use pool::{rank_results, ChannelProberPool, ChannelRanking};
pub use prober::{ProbeSettings, StreamProber};
pub use quality_scorer::QualityScorer;
