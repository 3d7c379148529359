//! Per-channel prober pool.
//!
//! Probes every candidate URL of one channel on its own task, bounded by a
//! per-channel semaphore and an optional global one, waits for the whole
//! batch and reduces it to the top-K URLs.

use std::sync::Arc;

use futures::future::join_all;
use iptv_rank_protocol::{CandidateUrl, Delay, ProbeResult, RankedEntry};
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::probe::prober::StreamProber;

/// Outcome of ranking one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelRanking {
    /// Every probe result, in URL order.
    pub results: Vec<ProbeResult>,
    /// Selected URLs, best first.
    pub entries: Vec<RankedEntry>,
}

/// Aborts the wrapped probe tasks when dropped.
///
/// Aborting drops the task's future and with it any child process.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs a channel's probes concurrently and ranks the results.
pub struct ChannelProberPool {
    prober: Arc<StreamProber>,
    /// Shared by all channels when a global probe cap is configured.
    global_limit: Option<Arc<Semaphore>>,
}

impl ChannelProberPool {
    /// Create a pool without a global probe cap.
    pub fn new(prober: Arc<StreamProber>) -> Self {
        Self {
            prober,
            global_limit: None,
        }
    }

    /// Create a pool whose probes also share a global cap across channels.
    pub fn with_global_limit(prober: Arc<StreamProber>, max_total_probes: usize) -> Self {
        Self {
            prober,
            global_limit: Some(Arc::new(Semaphore::new(max_total_probes.max(1)))),
        }
    }

    /// Probe and rank one channel.
    ///
    /// `entries` holds at most `top_k` URLs, best first. A channel with no
    /// reachable URL yields no entries. `results` keeps every probe result
    /// in URL order.
    pub async fn rank_channel(
        &self,
        channel: &str,
        urls: &[CandidateUrl],
        concurrency_cap: usize,
        top_k: usize,
    ) -> ChannelRanking {
        let results = self.probe_channel(channel, urls, concurrency_cap).await;
        let entries = rank_results(results.clone(), top_k);
        ChannelRanking { results, entries }
    }

    /// Probe every URL of a channel and wait for all of them.
    ///
    /// Results come back in URL order regardless of completion order.
    pub async fn probe_channel(
        &self,
        channel: &str,
        urls: &[CandidateUrl],
        concurrency_cap: usize,
    ) -> Vec<ProbeResult> {
        if urls.is_empty() {
            return Vec::new();
        }

        let permits = concurrency_cap.max(1).min(urls.len());
        let limiter = Arc::new(Semaphore::new(permits));
        debug!(
            "[{}] Probing {} URL(s), {} at a time",
            channel,
            urls.len(),
            permits
        );

        let handles: Vec<_> = urls
            .iter()
            .map(|url| {
                let prober = Arc::clone(&self.prober);
                let limiter = Arc::clone(&limiter);
                let global = self.global_limit.clone();
                let channel = channel.to_string();
                let url = url.clone();

                tokio::spawn(async move {
                    // Neither semaphore is ever closed, so acquire cannot fail.
                    let _permit = limiter.acquire_owned().await.ok();
                    let _global_permit = match global {
                        Some(global) => global.acquire_owned().await.ok(),
                        None => None,
                    };
                    prober.probe(&channel, &url).await
                })
            })
            .collect();

        // Cancelling this future must not leave probes running.
        let _abort = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
        let joined = join_all(handles).await;

        joined
            .into_iter()
            .zip(urls)
            .map(|(joined, url)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("[{}] Probe task for {} failed: {}", channel, url, e);
                    self.prober.metrics().record_panic();
                    let quality = self.prober.score(url);
                    ProbeResult::new(channel, url.as_str(), Delay::Unreachable, quality)
                }
            })
            .collect()
    }
}

/// Reduce a channel's probe results to its top-K entries.
///
/// Unreachable results are dropped. The rest are ordered by quality score
/// (descending), then delay (ascending); the sort is stable so remaining
/// ties keep input order.
pub fn rank_results(results: Vec<ProbeResult>, top_k: usize) -> Vec<RankedEntry> {
    let total = results.len();
    let mut reachable: Vec<ProbeResult> = results
        .into_iter()
        .filter(ProbeResult::is_reachable)
        .collect();

    if let Some(first) = reachable.first() {
        info!(
            "[{}] {}/{} URL(s) reachable, keeping up to {}",
            first.channel,
            reachable.len(),
            total,
            top_k
        );
    }

    reachable.sort_by(|a, b| {
        b.quality_score
            .cmp(&a.quality_score)
            .then_with(|| a.delay.cmp(&b.delay))
    });

    reachable
        .into_iter()
        .take(top_k)
        .map(ProbeResult::into_ranked)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::metrics::ProbeMetrics;
    use crate::probe::media_probe::{MediaProbe, ProbeOutcome};
    use crate::probe::prober::tests::ScriptedProbe;
    use crate::probe::prober::ProbeSettings;
    use crate::probe::quality_scorer::QualityScorer;

    fn result(url: &str, score: u32, delay: Delay) -> ProbeResult {
        ProbeResult::new("CCTV1", url, delay, score)
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    fn pool_with(media: Arc<dyn MediaProbe>) -> ChannelProberPool {
        let prober = StreamProber::new(
            media,
            QualityScorer::default(),
            ProbeSettings::default(),
            ProbeMetrics::new(),
        );
        ChannelProberPool::new(Arc::new(prober))
    }

    #[test]
    fn test_rank_quality_then_delay() {
        let results = vec![
            result("u1", 40, Delay::Millis(100)),
            result("u2", 40, Delay::Millis(50)),
            result("u3", 10, Delay::Millis(10)),
        ];
        let ranked: Vec<_> = rank_results(results, 8).into_iter().map(|e| e.url).collect();
        assert_eq!(ranked, vec!["u2", "u1", "u3"]);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let results = vec![
            result("first", 20, Delay::Millis(30)),
            result("second", 20, Delay::Millis(30)),
            result("third", 20, Delay::Millis(30)),
        ];
        let ranked: Vec<_> = rank_results(results, 8).into_iter().map(|e| e.url).collect();
        assert_eq!(ranked, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_drops_unreachable() {
        let results = vec![
            result("dead", 100, Delay::Unreachable),
            result("alive", 10, Delay::Millis(900)),
        ];
        let ranked = rank_results(results, 8);
        assert_eq!(ranked, vec![RankedEntry::new("CCTV1", "alive")]);

        let all_dead = vec![result("a", 50, Delay::Unreachable), result("b", 60, Delay::Unreachable)];
        assert!(rank_results(all_dead, 8).is_empty());
    }

    #[test]
    fn test_rank_top_k() {
        let results = (0..5)
            .map(|i| result(&format!("u{}", i), 10, Delay::Millis(i * 10)))
            .collect();
        let ranked = rank_results(results, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].url, "u0");
        assert_eq!(ranked[1].url, "u1");
    }

    #[tokio::test]
    async fn test_rank_channel_end_to_end() {
        let media = ScriptedProbe::new()
            .reachable("http://a/720p", 40)
            .reachable("http://b/1080p", 300)
            .reachable("http://c/1080p", 100)
            .timeout("http://d/4k");
        let pool = pool_with(Arc::new(media));

        let candidates = urls(&[
            "http://a/720p",
            "http://b/1080p",
            "http://c/1080p",
            "http://d/4k",
            "http://e/dead",
        ]);
        let ranked: Vec<_> = pool
            .rank_channel("CCTV1", &candidates, 8, 8)
            .await
            .entries
            .into_iter()
            .map(|e| e.url)
            .collect();

        assert_eq!(ranked, vec!["http://c/1080p", "http://b/1080p", "http://a/720p"]);
    }

    #[tokio::test]
    async fn test_probe_channel_keeps_url_order() {
        let media = ScriptedProbe::new()
            .reachable("http://a", 10)
            .reachable("http://b", 20);
        let pool = pool_with(Arc::new(media));

        let results = pool
            .probe_channel("CCTV1", &urls(&["http://b", "http://x", "http://a"]), 2)
            .await;
        let order: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, vec!["http://b", "http://x", "http://a"]);
    }

    #[tokio::test]
    async fn test_empty_channel() {
        let pool = pool_with(Arc::new(ScriptedProbe::new()));
        let ranking = pool.rank_channel("CCTV1", &[], 8, 8).await;
        assert!(ranking.entries.is_empty());
        assert!(ranking.results.is_empty());
    }

    /// Tracks the highest number of probes running at once.
    struct GaugeProbe {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MediaProbe for GaugeProbe {
        async fn probe(&self, _url: &str, _sample: Duration, _timeout: Duration) -> ProbeOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome::Success {
                elapsed: Duration::from_millis(20),
            }
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let media = Arc::new(GaugeProbe {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = pool_with(media.clone());

        let candidates: Vec<String> = (0..12).map(|i| format!("http://s/{}", i)).collect();
        let ranking = pool.rank_channel("CCTV1", &candidates, 3, 8).await;

        assert_eq!(ranking.results.len(), 12);
        assert_eq!(ranking.entries.len(), 8);
        assert!(media.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_global_limit() {
        let media = Arc::new(GaugeProbe {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let prober = StreamProber::new(
            media.clone(),
            QualityScorer::default(),
            ProbeSettings::default(),
            ProbeMetrics::new(),
        );
        let pool = ChannelProberPool::with_global_limit(Arc::new(prober), 2);

        let candidates: Vec<String> = (0..6).map(|i| format!("http://s/{}", i)).collect();
        let (a, b) = tokio::join!(
            pool.rank_channel("A", &candidates, 8, 8),
            pool.rank_channel("B", &candidates, 8, 8)
        );

        assert_eq!(a.entries.len(), 6);
        assert_eq!(b.entries.len(), 6);
        assert!(media.peak.load(Ordering::SeqCst) <= 2);
    }

    /// Sets a flag when its probe future is dropped, never finishes otherwise.
    struct StuckProbe {
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MediaProbe for StuckProbe {
        async fn probe(&self, _url: &str, _sample: Duration, _timeout: Duration) -> ProbeOutcome {
            let _guard = SetOnDrop(Arc::clone(&self.dropped));
            std::future::pending::<()>().await;
            ProbeOutcome::Timeout
        }
    }

    #[tokio::test]
    async fn test_cancelled_channel_aborts_probe_tasks() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pool = pool_with(Arc::new(StuckProbe {
            dropped: Arc::clone(&dropped),
        }));
        let candidates = urls(&["http://a/1", "http://a/2"]);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            pool.probe_channel("CCTV1", &candidates, 2),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dropped.load(Ordering::SeqCst));
    }
}
