//! Metrics collection for observability
//!
//! Prometheus metrics for the apply cycle, registered on a per-ledger
//! [`Registry`] so several ledgers can live in one process.
//!
//! # Metrics
//!
//! - `ledger_entries_appended_total` - Entries durably appended
//! - `ledger_entries_applied_total` - Entries that moved value in committed cycles
//! - `ledger_entries_rejected_total` - Entries skipped for insufficient funds in committed cycles
//! - `ledger_checkpoint_lsn` - Last committed LSN
//! - `ledger_replay_duration_seconds` - Histogram of replay latencies
//! - `ledger_snapshot_duration_seconds` - Histogram of snapshot persist latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0];

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Entries durably appended
    pub entries_appended: IntCounter,

    /// Entries applied during replay
    pub entries_applied: IntCounter,

    /// Entries skipped for insufficient funds
    pub entries_rejected: IntCounter,

    /// Last committed LSN
    pub checkpoint_lsn: IntGauge,

    /// Replay duration histogram
    pub replay_duration: Histogram,

    /// Snapshot persist duration histogram
    pub snapshot_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_appended = IntCounter::new(
            "ledger_entries_appended_total",
            "Entries durably appended to the log",
        )?;
        registry.register(Box::new(entries_appended.clone()))?;

        let entries_applied = IntCounter::new(
            "ledger_entries_applied_total",
            "Entries that moved value during replay",
        )?;
        registry.register(Box::new(entries_applied.clone()))?;

        let entries_rejected = IntCounter::new(
            "ledger_entries_rejected_total",
            "Entries skipped for insufficient funds",
        )?;
        registry.register(Box::new(entries_rejected.clone()))?;

        let checkpoint_lsn = IntGauge::new("ledger_checkpoint_lsn", "Last committed LSN")?;
        registry.register(Box::new(checkpoint_lsn.clone()))?;

        let replay_duration = Histogram::with_opts(
            HistogramOpts::new("ledger_replay_duration_seconds", "Histogram of replay latencies")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(replay_duration.clone()))?;

        let snapshot_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_snapshot_duration_seconds",
                "Histogram of snapshot persist latencies",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(snapshot_duration.clone()))?;

        Ok(Self {
            entries_appended,
            entries_applied,
            entries_rejected,
            checkpoint_lsn,
            replay_duration,
            snapshot_duration,
            registry,
        })
    }

    /// Record a durable append
    pub fn record_append(&self) {
        self.entries_appended.inc();
    }

    /// Record the outcome counts of one replay pass
    pub fn record_replay(&self, applied: usize, rejected: usize, duration_seconds: f64) {
        self.entries_applied.inc_by(applied as u64);
        self.entries_rejected.inc_by(rejected as u64);
        self.replay_duration.observe(duration_seconds);
    }

    /// Record snapshot persist duration
    pub fn record_snapshot(&self, duration_seconds: f64) {
        self.snapshot_duration.observe(duration_seconds);
    }

    /// Record a checkpoint commit
    pub fn record_commit(&self, lsn: u64) {
        self.checkpoint_lsn.set(i64::try_from(lsn).unwrap_or(i64::MAX));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
