//! Pipeline orchestrator.
//!
//! Takes the merged candidate map and the canonical order, ranks every
//! wanted channel through the [`ChannelProberPool`] and returns one flat
//! playlist sorted by canonical position.
//!
//! # Concurrency
//!
//! Per-channel probe concurrency is bounded by `probe_concurrency`.
//! How many channels are ranked at the same time is a separate, explicit
//! setting (`channel_concurrency`, default 1), so the total number of
//! external probe processes is at most
//! `probe_concurrency * channel_concurrency`. `max_total_probes` adds a
//! hard global cap on top of that.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use iptv_rank_protocol::{
    CandidateUrl, CanonicalOrder, ChannelCandidates, ChannelName, ProbeResult, RankedEntry,
    DEFAULT_PROBE_CONCURRENCY, DEFAULT_TOP_K,
};
use log::{debug, info};
use serde::Serialize;

use crate::metrics::RunMetrics;
use crate::probe::{ChannelProberPool, StreamProber};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Probes in flight per channel.
    pub probe_concurrency: usize,
    /// URLs kept per channel.
    pub top_k: usize,
    /// Channels ranked at the same time.
    pub channel_concurrency: usize,
    /// Optional cap on probes in flight across all channels.
    pub max_total_probes: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            top_k: DEFAULT_TOP_K,
            channel_concurrency: 1,
            max_total_probes: None,
        }
    }
}

/// Probe results and selection for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub channel: ChannelName,
    pub results: Vec<ProbeResult>,
    pub selected: Vec<CandidateUrl>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutput {
    /// Final playlist in canonical order.
    pub entries: Vec<RankedEntry>,
    /// Per-channel detail, in canonical order.
    pub channels: Vec<ChannelReport>,
}

/// Probe-score-rank-select pipeline.
pub struct Pipeline {
    pool: ChannelProberPool,
    config: PipelineConfig,
    metrics: Arc<RunMetrics>,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(prober: Arc<StreamProber>, config: PipelineConfig, metrics: Arc<RunMetrics>) -> Self {
        let pool = match config.max_total_probes {
            Some(limit) => ChannelProberPool::with_global_limit(prober, limit),
            None => ChannelProberPool::new(prober),
        };
        Self {
            pool,
            config,
            metrics,
        }
    }

    /// Rank all wanted channels.
    ///
    /// `entries` is the final playlist in canonical order; `channels` keeps
    /// every probe result for reporting.
    pub async fn run(
        &self,
        candidates: &ChannelCandidates,
        order: &CanonicalOrder,
    ) -> PipelineOutput {
        if candidates.is_empty() || order.is_empty() {
            info!(
                "Pipeline: nothing to rank (channels={}, canonical={})",
                candidates.len(),
                order.len()
            );
            return PipelineOutput::default();
        }

        let index = order.position_index();
        let selected: Vec<(&ChannelName, &[CandidateUrl])> = candidates
            .iter()
            .filter(|(name, _)| index.contains_key(name.as_str()))
            .collect();

        info!(
            "Pipeline: ranking {} of {} channel(s) ({} not in canonical order)",
            selected.len(),
            candidates.len(),
            candidates.len() - selected.len()
        );

        let mut channels: Vec<ChannelReport> = stream::iter(selected)
            .map(|(channel, urls)| self.rank_one(channel, urls))
            .buffer_unordered(self.config.channel_concurrency.max(1))
            .collect()
            .await;

        channels.sort_by_key(|report| canonical_position(&index, &report.channel));

        let entries: Vec<RankedEntry> = channels
            .iter()
            .flat_map(|report| {
                report
                    .selected
                    .iter()
                    .map(move |url| RankedEntry::new(report.channel.clone(), url.clone()))
            })
            .collect();

        self.metrics.record_emitted(entries.len());
        info!(
            "Pipeline: {} entr{} for {} channel(s)",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            channels.iter().filter(|c| !c.selected.is_empty()).count()
        );

        PipelineOutput { entries, channels }
    }

    async fn rank_one(&self, channel: &ChannelName, urls: &[CandidateUrl]) -> ChannelReport {
        let ranking = self
            .pool
            .rank_channel(channel, urls, self.config.probe_concurrency, self.config.top_k)
            .await;
        let selected: Vec<CandidateUrl> = ranking
            .entries
            .into_iter()
            .map(|entry| entry.url)
            .collect();

        self.metrics.record_channel(selected.len());
        if selected.is_empty() {
            info!("[{}] No reachable URL among {}", channel, urls.len());
        } else {
            debug!("[{}] Selected {:?}", channel, selected);
        }

        ChannelReport {
            channel: channel.clone(),
            results: ranking.results,
            selected,
        }
    }
}

fn canonical_position(index: &HashMap<&str, usize>, channel: &str) -> usize {
    index.get(channel).copied().unwrap_or(usize::MAX)
}
