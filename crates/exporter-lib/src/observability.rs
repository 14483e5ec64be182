//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus self-metrics (refresh latency, cycle outcomes, collector
//!   failures, token activity, snapshot freshness)
//! - Structured JSON logging with tracing

use crate::models::{CycleOutcome, RefreshCycle};
use crate::token::ProbeOutcome;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Encoder, Gauge, Histogram, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for refresh cycle duration (in seconds)
const REFRESH_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    refresh_duration_seconds: Histogram,
    refresh_cycles: IntCounterVec,
    collector_failures: IntCounterVec,
    collector_fragments: IntGaugeVec,
    token_exchanges: IntCounter,
    token_probes: IntCounterVec,
    snapshot_timestamp_seconds: Gauge,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            refresh_duration_seconds: register_histogram!(
                "zvirt_exporter_refresh_duration_seconds",
                "Time spent producing one snapshot candidate",
                REFRESH_BUCKETS.to_vec()
            )
            .expect("Failed to register refresh_duration_seconds"),

            refresh_cycles: register_int_counter_vec!(
                "zvirt_exporter_refresh_cycles_total",
                "Refresh cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register refresh_cycles_total"),

            collector_failures: register_int_counter_vec!(
                "zvirt_exporter_collector_failures_total",
                "Collector runs that failed and were left out of the snapshot",
                &["collector"]
            )
            .expect("Failed to register collector_failures_total"),

            collector_fragments: register_int_gauge_vec!(
                "zvirt_exporter_collector_fragments",
                "Metric families produced by each collector in the last successful run",
                &["collector"]
            )
            .expect("Failed to register collector_fragments"),

            token_exchanges: register_int_counter!(
                "zvirt_exporter_token_exchanges_total",
                "Credential exchanges performed against the SSO endpoint"
            )
            .expect("Failed to register token_exchanges_total"),

            token_probes: register_int_counter_vec!(
                "zvirt_exporter_token_probes_total",
                "Cached token probes by result",
                &["result"]
            )
            .expect("Failed to register token_probes_total"),

            snapshot_timestamp_seconds: register_gauge!(
                "zvirt_exporter_snapshot_timestamp_seconds",
                "Unix time at which the served snapshot was produced"
            )
            .expect("Failed to register snapshot_timestamp_seconds"),
        }
    }
}

/// Exporter self-metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the outcome and duration of a refresh cycle
    pub fn observe_cycle(&self, cycle: &RefreshCycle) {
        let inner = self.inner();
        inner
            .refresh_duration_seconds
            .observe(cycle.duration.as_secs_f64());
        inner
            .refresh_cycles
            .with_label_values(&[cycle.outcome.label()])
            .inc();

        if let CycleOutcome::Published { failed, .. } = &cycle.outcome {
            for failure in failed {
                inner
                    .collector_failures
                    .with_label_values(&[failure.collector.as_str()])
                    .inc();
            }
        }
    }

    /// Record how many families a collector contributed
    pub fn set_collector_fragments(&self, collector: &str, count: usize) {
        self.inner()
            .collector_fragments
            .with_label_values(&[collector])
            .set(count as i64);
    }

    /// Record the production time of the snapshot now being served
    pub fn set_snapshot_timestamp(&self, unix_seconds: f64) {
        self.inner().snapshot_timestamp_seconds.set(unix_seconds);
    }

    pub fn inc_token_exchanges(&self) {
        self.inner().token_exchanges.inc();
    }

    pub fn inc_token_probe(&self, outcome: ProbeOutcome) {
        let result = match outcome {
            ProbeOutcome::Accepted => "accepted",
            ProbeOutcome::Rejected => "rejected",
        };
        self.inner().token_probes.with_label_values(&[result]).inc();
    }

    /// Encode every registered metric in text exposition format
    pub fn encode(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode exporter metrics");
        }

        buffer
    }
}

/// Structured logger for exporter events
///
/// Emits event-tagged records so refresh behaviour can be followed in the
/// JSON log stream.
#[derive(Clone)]
pub struct StructuredLogger {
    engine: String,
}

impl StructuredLogger {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, collectors: &[&str]) {
        info!(
            event = "exporter_started",
            engine = %self.engine,
            exporter_version = %version,
            collectors = ?collectors,
            "zVirt exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            engine = %self.engine,
            reason = %reason,
            "zVirt exporter shutting down"
        );
    }

    /// Log the result of one refresh cycle
    pub fn log_cycle(&self, cycle: &RefreshCycle) {
        match &cycle.outcome {
            CycleOutcome::Published { succeeded, failed } if failed.is_empty() => {
                info!(
                    event = "refresh_cycle",
                    engine = %self.engine,
                    cycle = cycle.sequence,
                    outcome = cycle.outcome.label(),
                    collectors_ok = *succeeded,
                    elapsed_ms = cycle.duration.as_millis() as u64,
                    "Metrics updated"
                );
            }
            CycleOutcome::Published { succeeded, failed } => {
                warn!(
                    event = "refresh_cycle",
                    engine = %self.engine,
                    cycle = cycle.sequence,
                    outcome = cycle.outcome.label(),
                    collectors_ok = *succeeded,
                    collectors_failed = failed.len(),
                    elapsed_ms = cycle.duration.as_millis() as u64,
                    "Metrics updated with missing collectors"
                );
            }
            CycleOutcome::Retained { reason } => {
                error!(
                    event = "refresh_cycle",
                    engine = %self.engine,
                    cycle = cycle.sequence,
                    outcome = cycle.outcome.label(),
                    reason = %reason,
                    elapsed_ms = cycle.duration.as_millis() as u64,
                    "Metrics update failed, keeping previous snapshot"
                );
            }
        }
    }

    /// Log a collector left out of the snapshot
    pub fn log_collector_failure(&self, collector: &str, error: &str) {
        warn!(
            event = "collector_failed",
            engine = %self.engine,
            collector = %collector,
            error = %error,
            "Collector failed, excluding it from this snapshot"
        );
    }

    /// Log installation of a fresh token
    pub fn log_token_refresh(&self, reason: &str, generation: u64) {
        info!(
            event = "token_refreshed",
            engine = %self.engine,
            reason = %reason,
            generation = generation,
            "Obtained new SSO token"
        );
    }
}
