//! Single-URL stream prober.
//!
//! Wraps a [`MediaProbe`] with the loopback shortcut, the timeout bound,
//! quality scoring and per-probe diagnostics.

use std::sync::Arc;
use std::time::Duration;

use iptv_rank_protocol::{Delay, ProbeResult};
use log::debug;

use crate::metrics::ProbeMetrics;
use crate::probe::media_probe::{MediaProbe, ProbeOutcome};
use crate::probe::quality_scorer::QualityScorer;

/// Default overall timeout of one probe (seconds).
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default amount of media sampled by one probe (seconds).
pub const DEFAULT_SAMPLE_SECS: u64 = 3;

/// URL fragments that mark locally relayed streams.
pub const DEFAULT_LOCAL_PATTERNS: &[&str] = &["://127.0.0.1", "://localhost", "://[::1]"];

/// Prober settings.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Amount of media read by the external probe.
    pub sample: Duration,
    /// Overall time budget of one probe, process start included.
    pub timeout: Duration,
    /// Case-insensitive URL fragments that are never probed.
    pub local_patterns: Vec<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            sample: Duration::from_secs(DEFAULT_SAMPLE_SECS),
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            local_patterns: DEFAULT_LOCAL_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Probes one (channel, URL) pair into exactly one [`ProbeResult`].
pub struct StreamProber {
    media: Arc<dyn MediaProbe>,
    scorer: QualityScorer,
    settings: ProbeSettings,
    local_patterns: Vec<String>,
    metrics: Arc<ProbeMetrics>,
}

impl StreamProber {
    /// Create a new stream prober.
    pub fn new(
        media: Arc<dyn MediaProbe>,
        scorer: QualityScorer,
        settings: ProbeSettings,
        metrics: Arc<ProbeMetrics>,
    ) -> Self {
        let local_patterns = settings
            .local_patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.to_lowercase())
            .collect();
        Self {
            media,
            scorer,
            settings,
            local_patterns,
            metrics,
        }
    }

    /// Probe a URL. Never fails; failures become [`Delay::Unreachable`].
    pub async fn probe(&self, channel: &str, url: &str) -> ProbeResult {
        let quality = self.scorer.score(url);

        if self.is_local(url) {
            self.metrics.record_local_shortcut();
            debug!("[{}] {} is local, skipping probe", channel, url);
            return ProbeResult::new(channel, url, Delay::Millis(0), quality);
        }

        self.metrics.record_started();
        debug!("[{}] Probing {} (quality={})", channel, url, quality);

        let outcome = match tokio::time::timeout(
            self.settings.timeout,
            self.media.probe(url, self.settings.sample, self.settings.timeout),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Timeout,
        };

        match &outcome {
            ProbeOutcome::Success { elapsed } => {
                self.metrics.record_reachable(*elapsed);
                debug!(
                    "[{}] {} reachable in {}ms",
                    channel,
                    url,
                    elapsed.as_millis()
                );
            }
            ProbeOutcome::Failure { reason } => {
                self.metrics.record_failure();
                debug!("[{}] {} unreachable: {}", channel, url, reason);
            }
            ProbeOutcome::Timeout => {
                self.metrics.record_timeout();
                debug!(
                    "[{}] {} timed out after {}s",
                    channel,
                    url,
                    self.settings.timeout.as_secs_f64()
                );
            }
        }

        ProbeResult::new(channel, url, outcome.delay(), quality)
    }

    /// Quality score of a URL without probing it.
    pub fn score(&self, url: &str) -> u32 {
        self.scorer.score(url)
    }

    pub fn metrics(&self) -> &Arc<ProbeMetrics> {
        &self.metrics
    }

    fn is_local(&self, url: &str) -> bool {
        if self.local_patterns.is_empty() {
            return false;
        }
        let url = url.to_lowercase();
        self.local_patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Media probe with canned outcomes. Unknown URLs fail.
    pub(crate) struct ScriptedProbe {
        outcomes: HashMap<String, ProbeOutcome>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedProbe {
        pub(crate) fn new() -> Self {
            Self {
                outcomes: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn reachable(mut self, url: &str, ms: u64) -> Self {
            self.outcomes.insert(
                url.to_string(),
                ProbeOutcome::Success {
                    elapsed: Duration::from_millis(ms),
                },
            );
            self
        }

        pub(crate) fn timeout(mut self, url: &str) -> Self {
            self.outcomes.insert(url.to_string(), ProbeOutcome::Timeout);
            self
        }
    }

    #[async_trait]
    impl MediaProbe for ScriptedProbe {
        async fn probe(&self, url: &str, _sample: Duration, _timeout: Duration) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .get(url)
                .cloned()
                .unwrap_or_else(|| ProbeOutcome::Failure {
                    reason: "connection refused".to_string(),
                })
        }
    }

    /// Media probe that never finishes.
    struct HangingProbe;

    #[async_trait]
    impl MediaProbe for HangingProbe {
        async fn probe(&self, _url: &str, _sample: Duration, _timeout: Duration) -> ProbeOutcome {
            std::future::pending::<()>().await;
            ProbeOutcome::Timeout
        }
    }

    fn prober_with(media: Arc<dyn MediaProbe>, settings: ProbeSettings) -> StreamProber {
        StreamProber::new(media, QualityScorer::default(), settings, ProbeMetrics::new())
    }

    #[tokio::test]
    async fn test_reachable_probe() {
        let media = Arc::new(ScriptedProbe::new().reachable("http://a/1080p.m3u8", 120));
        let prober = prober_with(media, ProbeSettings::default());

        let result = prober.probe("CCTV1", "http://a/1080p.m3u8").await;
        assert_eq!(result.channel, "CCTV1");
        assert_eq!(result.delay, Delay::Millis(120));
        assert_eq!(result.quality_score, 80);
        assert_eq!(prober.metrics().reachable(), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_keeps_score() {
        let media = Arc::new(ScriptedProbe::new().timeout("http://a/720p"));
        let prober = prober_with(media, ProbeSettings::default());

        let failed = prober.probe("CCTV1", "http://dead/1080p").await;
        assert_eq!(failed.delay, Delay::Unreachable);
        assert_eq!(failed.quality_score, 80);

        let timed_out = prober.probe("CCTV1", "http://a/720p").await;
        assert_eq!(timed_out.delay, Delay::Unreachable);
        assert_eq!(prober.metrics().failed(), 1);
        assert_eq!(prober.metrics().timed_out(), 1);
    }

    #[tokio::test]
    async fn test_local_shortcut_skips_media_probe() {
        let media = Arc::new(ScriptedProbe::new());
        let prober = prober_with(media.clone(), ProbeSettings::default());

        let result = prober.probe("CCTV1", "http://LOCALHOST:8080/cctv1").await;
        assert_eq!(result.delay, Delay::Millis(0));
        assert_eq!(media.calls.load(Ordering::SeqCst), 0);
        assert_eq!(prober.metrics().local_shortcuts(), 1);
    }

    #[tokio::test]
    async fn test_no_local_patterns() {
        let media = Arc::new(ScriptedProbe::new());
        let settings = ProbeSettings {
            local_patterns: vec![String::new()],
            ..ProbeSettings::default()
        };
        let prober = prober_with(media.clone(), settings);

        let result = prober.probe("CCTV1", "http://127.0.0.1/cctv1").await;
        assert_eq!(result.delay, Delay::Unreachable);
        assert_eq!(media.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_bound_applies_to_any_media_probe() {
        let settings = ProbeSettings {
            timeout: Duration::from_millis(100),
            ..ProbeSettings::default()
        };
        let prober = prober_with(Arc::new(HangingProbe), settings);

        let start = std::time::Instant::now();
        let result = prober.probe("CCTV1", "http://a/1").await;
        assert_eq!(result.delay, Delay::Unreachable);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(prober.metrics().timed_out(), 1);
    }
}
