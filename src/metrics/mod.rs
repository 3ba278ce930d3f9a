// Private module declaration
mod server;

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the event store
// ============================================================================
//
// Provides metrics for:
// - Appends (by entity and concurrency mode), events written, latency
// - Optimistic conflicts and exclusive lease timeouts / wait time
// - Audit records that fell back to "unclassified"
// - Administrative snapshot rebuilds
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Concurrency mode label of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    Optimistic,
    Exclusive,
}

impl AppendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppendMode::Optimistic => "optimistic",
            AppendMode::Exclusive => "exclusive",
        }
    }
}

/// Central metrics registry for the event store
pub struct StoreMetrics {
    registry: Registry,

    // Append Metrics
    pub appends_total: IntCounterVec,
    pub events_appended: IntCounterVec,
    pub append_duration: HistogramVec,

    // Concurrency Metrics
    pub version_conflicts: IntCounterVec,
    pub lock_unavailable: IntCounter,
    pub lock_wait: Histogram,

    // Projection Metrics
    pub audit_unclassified: IntCounterVec,
    pub snapshots_rebuilt: IntCounter,
}

impl StoreMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Append Metrics
        let appends_total = IntCounterVec::new(
            Opts::new("es_appends_total", "Total committed appends"),
            &["entity", "mode"],
        )?;
        registry.register(Box::new(appends_total.clone()))?;

        let events_appended = IntCounterVec::new(
            Opts::new("es_events_appended_total", "Total events committed"),
            &["entity"],
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let append_duration = HistogramVec::new(
            HistogramOpts::new("es_append_duration_seconds", "Append duration including projections")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["entity"],
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        // Concurrency Metrics
        let version_conflicts = IntCounterVec::new(
            Opts::new("es_version_conflicts_total", "Appends rejected by the optimistic version check"),
            &["entity"],
        )?;
        registry.register(Box::new(version_conflicts.clone()))?;

        let lock_unavailable = IntCounter::new(
            "es_lock_unavailable_total",
            "Exclusive leases not acquired within the timeout",
        )?;
        registry.register(Box::new(lock_unavailable.clone()))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("es_lock_wait_seconds", "Time spent waiting for a stream lease")
                .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        // Projection Metrics
        let audit_unclassified = IntCounterVec::new(
            Opts::new("es_audit_unclassified_total", "Audit records without a registered module"),
            &["event_type"],
        )?;
        registry.register(Box::new(audit_unclassified.clone()))?;

        let snapshots_rebuilt = IntCounter::new(
            "es_snapshots_rebuilt_total",
            "Snapshots rewritten by administrative rebuilds",
        )?;
        registry.register(Box::new(snapshots_rebuilt.clone()))?;

        Ok(Self {
            registry,
            appends_total,
            events_appended,
            append_duration,
            version_conflicts,
            lock_unavailable,
            lock_wait,
            audit_unclassified,
            snapshots_rebuilt,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a committed append
    pub fn record_append(&self, entity: &str, mode: AppendMode, event_count: usize, duration_secs: f64) {
        self.appends_total.with_label_values(&[entity, mode.as_str()]).inc();
        self.events_appended
            .with_label_values(&[entity])
            .inc_by(event_count as u64);
        self.append_duration.with_label_values(&[entity]).observe(duration_secs);
    }

    pub fn record_conflict(&self, entity: &str) {
        self.version_conflicts.with_label_values(&[entity]).inc();
    }

    pub fn record_lock_wait(&self, wait_secs: f64, acquired: bool) {
        self.lock_wait.observe(wait_secs);
        if !acquired {
            self.lock_unavailable.inc();
        }
    }

    pub fn record_unclassified(&self, event_type: &str) {
        self.audit_unclassified.with_label_values(&[event_type]).inc();
    }

    pub fn record_rebuilt(&self, count: usize) {
        self.snapshots_rebuilt.inc_by(count as u64);
    }
}
