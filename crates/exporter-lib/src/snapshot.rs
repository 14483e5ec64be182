//! Last known-good snapshot shared between the refresh loop and the API
//!
//! Snapshots are immutable once published and handed out as `Arc`s, so a
//! publish is a single pointer swap under the lock and readers hold the lock
//! only long enough to clone the pointer.

use crate::models::Snapshot;
use std::sync::{Arc, RwLock};

/// Exposition prelude for the readiness metric
const NOT_READY_HEADER: &str = "# HELP zvirt_exporter_not_ready Exporter cache is not ready\n\
                                # TYPE zvirt_exporter_not_ready gauge\n";

/// Name of the readiness metric served with every scrape
pub const NOT_READY_METRIC: &str = "zvirt_exporter_not_ready";

/// Cloneable handle to the current snapshot
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    current: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot currently served, if one was ever published
    pub fn read(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the served snapshot wholesale
    pub fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(snapshot);
    }

    /// Render the scrape response for the current snapshot
    pub fn render(&self) -> String {
        render_exposition(self.read().as_deref())
    }
}

/// Snapshot body followed by the readiness metric.
///
/// Without a snapshot only the readiness metric is returned, with value 1.
pub fn render_exposition(snapshot: Option<&Snapshot>) -> String {
    match snapshot {
        None => format!("{NOT_READY_HEADER}{NOT_READY_METRIC} 1\n"),
        Some(snapshot) => {
            let mut out = String::with_capacity(snapshot.body.len() + NOT_READY_HEADER.len() + 32);
            out.push_str(&snapshot.body);
            if !snapshot.body.is_empty() && !snapshot.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(NOT_READY_HEADER);
            out.push_str(NOT_READY_METRIC);
            out.push_str(" 0\n");
            out
        }
    }
}
