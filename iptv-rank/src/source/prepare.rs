//! Input preparation before ranking.
//!
//! Normalization, URL dedup and early filtering all happen here, on the
//! caller side of the pipeline. The pipeline itself takes names as given.

use std::collections::{HashMap, HashSet};

use iptv_rank_protocol::{CanonicalOrder, ChannelCandidates, ChannelName, ChannelNormalizer};
use log::info;

use crate::pipeline::PipelineOutput;

/// Number of channel names shown in the match summary.
const SAMPLE_NAMES: usize = 5;

/// Preparation switches.
#[derive(Debug, Clone, Copy)]
pub struct PrepareOptions {
    /// Map names of both inputs through the normalizer.
    pub normalize: bool,
    /// Drop repeated URLs within a channel.
    pub dedup_urls: bool,
    /// Drop channels missing from the canonical order right away.
    pub drop_unwanted: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            dedup_urls: true,
            drop_unwanted: true,
        }
    }
}

/// Maps matching keys back to the names written in the canonical order.
#[derive(Debug, Clone, Default)]
pub struct DisplayNames {
    names: HashMap<ChannelName, ChannelName>,
}

impl DisplayNames {
    /// Canonical spelling of a matching key, or the key itself.
    pub fn display<'a>(&'a self, key: &'a str) -> &'a str {
        self.names.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Rewrite every channel name of a run to its canonical spelling.
    pub fn restore(&self, output: &mut PipelineOutput) {
        if self.names.is_empty() {
            return;
        }
        for entry in &mut output.entries {
            entry.channel = self.display(&entry.channel).to_string();
        }
        for report in &mut output.channels {
            report.channel = self.display(&report.channel).to_string();
            for result in &mut report.results {
                result.channel = self.display(&result.channel).to_string();
            }
        }
    }
}

/// Inputs ready for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PreparedInputs {
    pub candidates: ChannelCandidates,
    pub order: CanonicalOrder,
    pub display_names: DisplayNames,
}

/// Bring candidates and canonical order into one identity space.
///
/// Normalized names are only matching keys. The first canonical name that
/// produced a key is kept in [`DisplayNames`] for writing output.
pub fn prepare_inputs(
    candidates: ChannelCandidates,
    order: CanonicalOrder,
    normalizer: &dyn ChannelNormalizer,
    options: PrepareOptions,
) -> PreparedInputs {
    let mut display_names = DisplayNames::default();

    let (mut candidates, order) = if options.normalize {
        for raw in order.iter() {
            let key = normalizer.normalize(raw);
            if !key.is_empty() {
                display_names.names.entry(key).or_insert_with(|| raw.clone());
            }
        }

        let mut candidates = candidates.map_names(|name| normalizer.normalize(name));
        candidates.retain_channels(|name| !name.is_empty());
        let order = CanonicalOrder::new(
            order
                .iter()
                .map(|name| normalizer.normalize(name))
                .filter(|name| !name.is_empty())
                .collect(),
        );
        (candidates, order)
    } else {
        (candidates, order)
    };

    if options.dedup_urls {
        let removed = candidates.dedup_urls();
        if removed > 0 {
            info!("Removed {} duplicate URL(s)", removed);
        }
    }

    if options.drop_unwanted {
        let wanted: HashSet<&str> = order.iter().map(String::as_str).collect();
        candidates.retain_channels(|name| wanted.contains(name));
    }

    let sample: Vec<&str> = candidates
        .channels()
        .take(SAMPLE_NAMES)
        .map(|name| display_names.display(name))
        .collect();
    info!(
        "Matched {} channel(s) with {} URL(s), e.g. {:?}",
        candidates.len(),
        candidates.url_count(),
        sample
    );

    PreparedInputs {
        candidates,
        order,
        display_names,
    }
}
