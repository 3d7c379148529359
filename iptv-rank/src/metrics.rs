//! Probe and run metrics collection and reporting.
//!
//! This module provides probe-level and run-level counters:
//! - Probe attempts and their outcome (reachable, failed, timed out)
//! - Loopback shortcuts that skipped the external probe
//! - Latency of reachable streams
//! - Channels ranked and entries emitted per run

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;

/// Counters shared by every probe of a run.
pub struct ProbeMetrics {
    /// External probes started.
    started: AtomicU64,
    /// Probes that answered.
    reachable: AtomicU64,
    /// Probes that failed to spawn or exited non-zero.
    failed: AtomicU64,
    /// Probes killed after the timeout budget.
    timed_out: AtomicU64,
    /// URLs short-circuited by a loopback pattern.
    local_shortcuts: AtomicU64,
    /// Probe tasks that panicked.
    panicked: AtomicU64,
    /// Sum of reachable delays (milliseconds).
    total_delay_ms: AtomicU64,
}

impl ProbeMetrics {
    /// Create a new probe metrics instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an external probe being started.
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reachable stream and its delay.
    pub fn record_reachable(&self, delay: Duration) {
        self.reachable.fetch_add(1, Ordering::Relaxed);
        self.total_delay_ms
            .fetch_add(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a failed probe.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a probe killed by the timeout.
    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a loopback URL that was not probed.
    pub fn record_local_shortcut(&self) {
        self.local_shortcuts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a probe task that panicked.
    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn reachable(&self) -> u64 {
        self.reachable.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn local_shortcuts(&self) -> u64 {
        self.local_shortcuts.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Average delay of reachable external probes (milliseconds).
    pub fn average_delay_ms(&self) -> f64 {
        let reachable = self.reachable();
        if reachable == 0 {
            return 0.0;
        }
        self.total_delay_ms.load(Ordering::Relaxed) as f64 / reachable as f64
    }

    /// Fraction of external probes that answered (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        let started = self.started();
        if started == 0 {
            return 0.0;
        }
        self.reachable() as f64 / started as f64
    }

    /// Print a human-readable metrics report.
    pub fn print_report(&self) {
        info!(
            "[Probe] Metrics: started={}, reachable={} ({:.1}%), failed={}, timed_out={}, \
             local={}, panicked={}, avg_delay={:.0}ms",
            self.started(),
            self.reachable(),
            self.success_rate() * 100.0,
            self.failed(),
            self.timed_out(),
            self.local_shortcuts(),
            self.panicked(),
            self.average_delay_ms()
        );
    }
}

impl Default for ProbeMetrics {
    fn default() -> Self {
        ProbeMetrics {
            started: AtomicU64::new(0),
            reachable: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            local_shortcuts: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            total_delay_ms: AtomicU64::new(0),
        }
    }
}

/// Run-level metrics aggregator.
pub struct RunMetrics {
    /// Run start time.
    start_time: Instant,
    /// Channels handed to the prober pool.
    channels_ranked: AtomicU64,
    /// Channels where no URL was reachable.
    channels_empty: AtomicU64,
    /// Entries in the final playlist.
    entries_emitted: AtomicU64,
}

impl RunMetrics {
    /// Create a new run metrics instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record one ranked channel and how many entries it kept.
    pub fn record_channel(&self, kept: usize) {
        self.channels_ranked.fetch_add(1, Ordering::Relaxed);
        if kept == 0 {
            self.channels_empty.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the size of the final playlist.
    pub fn record_emitted(&self, entries: usize) {
        self.entries_emitted
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn channels_ranked(&self) -> u64 {
        self.channels_ranked.load(Ordering::Relaxed)
    }

    pub fn channels_empty(&self) -> u64 {
        self.channels_empty.load(Ordering::Relaxed)
    }

    pub fn entries_emitted(&self) -> u64 {
        self.entries_emitted.load(Ordering::Relaxed)
    }

    /// Time since the run started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Print a run metrics report.
    pub fn print_report(&self) {
        info!(
            "[Run] Metrics: channels={} (empty={}), entries={}, elapsed={:.1}s",
            self.channels_ranked(),
            self.channels_empty(),
            self.entries_emitted(),
            self.elapsed().as_secs_f64()
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        RunMetrics {
            start_time: Instant::now(),
            channels_ranked: AtomicU64::new(0),
            channels_empty: AtomicU64::new(0),
            entries_emitted: AtomicU64::new(0),
        }
    }
}
