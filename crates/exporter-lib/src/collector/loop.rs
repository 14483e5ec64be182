//! Snapshot refresh loop
//!
//! Runs one aggregation per cycle and publishes the result. A cycle whose
//! token acquisition fails or panics leaves the cached snapshot in place; the
//! loop itself never stops on a failed cycle, only on shutdown.

use super::{Aggregation, Aggregator};
use crate::error::{ExporterError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{CycleOutcome, RefreshCycle};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::snapshot::SnapshotCache;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{info, warn};

/// Configuration for the refresh loop
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Target time between cycle starts (default: 5 seconds)
    pub cadence: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(5),
        }
    }
}

/// Background worker keeping the snapshot cache fresh
pub struct RefreshLoop {
    aggregator: Aggregator,
    snapshots: SnapshotCache,
    health: HealthRegistry,
    metrics: ExporterMetrics,
    logger: Option<StructuredLogger>,
    config: RefreshConfig,
    sequence: u64,
}

impl RefreshLoop {
    /// Run cycles until `shutdown` fires. The first cycle starts immediately.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            cadence_ms = self.config.cadence.as_millis() as u64,
            collectors = self.aggregator.collectors().len(),
            "Starting snapshot refresh loop"
        );

        loop {
            let start = Instant::now();
            self.run_cycle().await;

            // A cycle longer than the cadence is followed immediately by the next
            let pause = self.config.cadence.saturating_sub(start.elapsed());

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.recv() => {
                    info!(cycles = self.sequence, "Shutting down snapshot refresh loop");
                    break;
                }
            }
        }
    }

    /// Execute one cycle and record its outcome
    pub async fn run_cycle(&mut self) -> RefreshCycle {
        self.sequence += 1;
        let started_at = Utc::now();
        let start = Instant::now();

        // Spawned so a panic in token acquisition only costs this cycle
        let aggregator = self.aggregator.clone();
        let outcome = match tokio::spawn(async move { aggregator.run().await }).await {
            Ok(Ok(aggregation)) => self.publish(aggregation).await,
            Ok(Err(e)) => self.retain(e.to_string()).await,
            Err(e) => {
                // Whatever the aborted run left cached is not trusted
                self.aggregator.tokens().invalidate();
                self.retain(format!("refresh task aborted: {e}")).await
            }
        };

        let cycle = RefreshCycle {
            sequence: self.sequence,
            started_at,
            duration: start.elapsed(),
            outcome,
        };

        self.metrics.observe_cycle(&cycle);
        if let Some(logger) = &self.logger {
            logger.log_cycle(&cycle);
        }

        cycle
    }

    async fn publish(&self, aggregation: Aggregation) -> CycleOutcome {
        let succeeded = aggregation.succeeded();
        let Aggregation {
            snapshot,
            failures,
            fragment_counts,
        } = aggregation;

        for (collector, count) in &fragment_counts {
            self.metrics.set_collector_fragments(collector, *count);
            self.health.set_healthy(collector).await;
        }

        for failure in &failures {
            if let Some(logger) = &self.logger {
                logger.log_collector_failure(&failure.collector, &failure.error);
            }
            self.health
                .set_degraded(&failure.collector, failure.error.clone())
                .await;
        }

        if snapshot.is_empty() {
            warn!(
                failed = failures.len(),
                "Publishing empty snapshot, no collector produced output"
            );
        }

        self.metrics
            .set_snapshot_timestamp(snapshot.produced_at.timestamp_millis() as f64 / 1000.0);
        self.snapshots.publish(snapshot);

        self.health.set_healthy(components::TOKEN).await;
        self.health.set_healthy(components::REFRESH).await;
        self.health.set_ready(true).await;

        CycleOutcome::Published {
            succeeded,
            failed: failures,
        }
    }

    async fn retain(&self, reason: String) -> CycleOutcome {
        let status = match self.snapshots.read() {
            Some(previous) => format!(
                "previous snapshot retained, {}s old",
                previous.age(Utc::now()).as_secs()
            ),
            None => "no snapshot published yet".to_string(),
        };

        self.health
            .set_unhealthy(components::TOKEN, reason.clone())
            .await;
        self.health.set_degraded(components::REFRESH, status).await;

        CycleOutcome::Retained { reason }
    }
}

/// Builder for the refresh loop
pub struct RefreshLoopBuilder {
    aggregator: Option<Aggregator>,
    snapshots: Option<SnapshotCache>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: RefreshConfig,
}

impl RefreshLoopBuilder {
    pub fn new() -> Self {
        Self {
            aggregator: None,
            snapshots: None,
            health: None,
            logger: None,
            config: RefreshConfig::default(),
        }
    }

    pub fn aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Cache the loop publishes into; share a clone with the API
    pub fn snapshots(mut self, snapshots: SnapshotCache) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn cadence(mut self, cadence: Duration) -> Self {
        self.config.cadence = cadence;
        self
    }

    pub fn build(self) -> Result<RefreshLoop> {
        let aggregator = self
            .aggregator
            .ok_or_else(|| ExporterError::Config("aggregator is required".to_string()))?;
        let snapshots = self
            .snapshots
            .ok_or_else(|| ExporterError::Config("snapshot cache is required".to_string()))?;

        Ok(RefreshLoop {
            aggregator,
            snapshots,
            health: self.health.unwrap_or_default(),
            metrics: ExporterMetrics::new(),
            logger: self.logger,
            config: self.config,
            sequence: 0,
        })
    }
}

impl Default for RefreshLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
