//! Data model shared by the fetchers, the ranking engine and the writer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of URLs kept per channel.
pub const DEFAULT_TOP_K: usize = 8;

/// Default number of probes in flight for a single channel.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 8;

/// URL value marking a group header line (`央视频道,#genre#`).
pub const GENRE_MARKER: &str = "#genre#";

/// Channel identity, raw or normalized depending on the caller.
pub type ChannelName = String;

/// One stream endpoint proposed for a channel.
pub type CandidateUrl = String;

/// Probe latency.
///
/// `Unreachable` is declared last so that the derived ordering puts it after
/// every finite delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delay {
    /// Stream answered; wall-clock time of the probe in milliseconds.
    Millis(u64),
    /// Stream failed, exited non-zero or timed out.
    Unreachable,
}

impl Delay {
    /// Returns true if the stream answered.
    pub fn is_reachable(&self) -> bool {
        matches!(self, Delay::Millis(_))
    }

    /// Delay in milliseconds, if reachable.
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            Delay::Millis(ms) => Some(*ms),
            Delay::Unreachable => None,
        }
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Millis(ms) => write!(f, "{}ms", ms),
            Delay::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Outcome of probing one candidate URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub channel: ChannelName,
    pub url: CandidateUrl,
    pub delay: Delay,
    pub quality_score: u32,
}

impl ProbeResult {
    pub fn new(
        channel: impl Into<ChannelName>,
        url: impl Into<CandidateUrl>,
        delay: Delay,
        quality_score: u32,
    ) -> Self {
        Self {
            channel: channel.into(),
            url: url.into(),
            delay,
            quality_score,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.delay.is_reachable()
    }

    /// Drop the measurements, keeping the (channel, url) pair.
    pub fn into_ranked(self) -> RankedEntry {
        RankedEntry {
            channel: self.channel,
            url: self.url,
        }
    }
}

/// A (channel, url) pair that survived ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedEntry {
    pub channel: ChannelName,
    pub url: CandidateUrl,
}

impl RankedEntry {
    pub fn new(channel: impl Into<ChannelName>, url: impl Into<CandidateUrl>) -> Self {
        Self {
            channel: channel.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RankedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.channel, self.url)
    }
}

/// Channel name to candidate URLs.
///
/// Channels keep their first-insertion order and URLs keep their push order,
/// so two runs over the same sources see the same sequence. Duplicate URLs
/// are kept until [`ChannelCandidates::dedup_urls`] is called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCandidates {
    order: Vec<ChannelName>,
    urls: HashMap<ChannelName, Vec<CandidateUrl>>,
}

impl ChannelCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a URL to a channel, creating the channel if needed.
    pub fn push(&mut self, channel: impl Into<ChannelName>, url: impl Into<CandidateUrl>) {
        let channel = channel.into();
        match self.urls.get_mut(&channel) {
            Some(urls) => urls.push(url.into()),
            None => {
                self.order.push(channel.clone());
                self.urls.insert(channel, vec![url.into()]);
            }
        }
    }

    /// URLs for a channel in push order.
    pub fn get(&self, channel: &str) -> Option<&[CandidateUrl]> {
        self.urls.get(channel).map(Vec::as_slice)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.urls.contains_key(channel)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total number of URLs across all channels.
    pub fn url_count(&self) -> usize {
        self.urls.values().map(Vec::len).sum()
    }

    /// Channel names in first-insertion order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelName> {
        self.order.iter()
    }

    /// (channel, urls) pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelName, &[CandidateUrl])> {
        self.order
            .iter()
            .filter_map(move |name| self.urls.get(name).map(|urls| (name, urls.as_slice())))
    }

    /// Remove repeated URLs within each channel, keeping the first one.
    ///
    /// Returns the number of URLs removed.
    pub fn dedup_urls(&mut self) -> usize {
        let mut removed = 0;
        for urls in self.urls.values_mut() {
            let before = urls.len();
            let mut seen = std::collections::HashSet::with_capacity(before);
            urls.retain(|url| seen.insert(url.clone()));
            removed += before - urls.len();
        }
        removed
    }

    /// Keep only channels for which `keep` returns true.
    pub fn retain_channels<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let urls = &mut self.urls;
        self.order.retain(|name| {
            if keep(name.as_str()) {
                true
            } else {
                urls.remove(name);
                false
            }
        });
    }

    /// Rename every channel with `rename`, merging channels that collide.
    ///
    /// Merged URL lists are concatenated in first-seen channel order.
    pub fn map_names<F>(self, mut rename: F) -> Self
    where
        F: FnMut(&str) -> ChannelName,
    {
        let mut mapped = Self::new();
        let mut urls = self.urls;
        for name in self.order {
            let new_name = rename(name.as_str());
            for url in urls.remove(&name).unwrap_or_default() {
                mapped.push(new_name.clone(), url);
            }
        }
        mapped
    }
}

impl FromIterator<(ChannelName, CandidateUrl)> for ChannelCandidates {
    fn from_iter<I: IntoIterator<Item = (ChannelName, CandidateUrl)>>(iter: I) -> Self {
        let mut candidates = Self::new();
        candidates.extend(iter);
        candidates
    }
}

impl Extend<(ChannelName, CandidateUrl)> for ChannelCandidates {
    fn extend<I: IntoIterator<Item = (ChannelName, CandidateUrl)>>(&mut self, iter: I) {
        for (channel, url) in iter {
            self.push(channel, url);
        }
    }
}

/// Authoritative list of wanted channels in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    names: Vec<ChannelName>,
}

impl CanonicalOrder {
    pub fn new(names: Vec<ChannelName>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelName> {
        self.names.iter()
    }

    /// Position of each name, using the first occurrence of repeated names.
    pub fn position_index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.names.len());
        for (pos, name) in self.names.iter().enumerate() {
            index.entry(name.as_str()).or_insert(pos);
        }
        index
    }

    /// Rename every entry with `rename`. Order and repeats are preserved.
    pub fn map_names<F>(self, rename: F) -> Self
    where
        F: FnMut(&ChannelName) -> ChannelName,
    {
        Self {
            names: self.names.iter().map(rename).collect(),
        }
    }
}

impl FromIterator<ChannelName> for CanonicalOrder {
    fn from_iter<I: IntoIterator<Item = ChannelName>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_ordering() {
        assert!(Delay::Millis(0) < Delay::Millis(10));
        assert!(Delay::Millis(u64::MAX) < Delay::Unreachable);
        assert_eq!(Delay::Unreachable.as_millis(), None);
        assert!(!Delay::Unreachable.is_reachable());
    }

    #[test]
    fn test_candidates_keep_insertion_order() {
        let mut candidates = ChannelCandidates::new();
        candidates.push("B", "http://b/1");
        candidates.push("A", "http://a/1");
        candidates.push("B", "http://b/2");

        let names: Vec<_> = candidates.channels().cloned().collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(candidates.get("B").unwrap(), ["http://b/1", "http://b/2"]);
        assert_eq!(candidates.url_count(), 3);
    }

    #[test]
    fn test_candidates_dedup_urls() {
        let mut candidates = ChannelCandidates::new();
        candidates.push("A", "http://a/1");
        candidates.push("A", "http://a/2");
        candidates.push("A", "http://a/1");

        assert_eq!(candidates.dedup_urls(), 1);
        assert_eq!(candidates.get("A").unwrap(), ["http://a/1", "http://a/2"]);
    }

    #[test]
    fn test_candidates_map_names_merges() {
        let mut candidates = ChannelCandidates::new();
        candidates.push("cctv-1", "http://a/1");
        candidates.push("CCTV1", "http://a/2");
        candidates.push("cctv2", "http://b/1");

        let mapped = candidates.map_names(|n| n.replace('-', "").to_uppercase());
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped.get("CCTV1").unwrap(), ["http://a/1", "http://a/2"]);
    }

    #[test]
    fn test_candidates_retain() {
        let mut candidates: ChannelCandidates = vec![
            ("A".to_string(), "u1".to_string()),
            ("B".to_string(), "u2".to_string()),
        ]
        .into_iter()
        .collect();

        candidates.retain_channels(|name| name == "B");
        assert!(!candidates.contains("A"));
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_position_index_first_seen() {
        let order = CanonicalOrder::new(vec!["B".into(), "A".into(), "B".into()]);
        let index = order.position_index();
        assert_eq!(index.get("B"), Some(&0));
        assert_eq!(index.get("A"), Some(&1));
        assert_eq!(index.get("C"), None);
    }

    #[test]
    fn test_ranked_entry_display() {
        let entry = RankedEntry::new("CCTV1", "http://a/1");
        assert_eq!(entry.to_string(), "CCTV1,http://a/1");
    }
}
