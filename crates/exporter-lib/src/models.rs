//! Core data models for the exporter

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque bearer credential issued by the engine SSO endpoint.
///
/// Cloning is cheap; the value is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(Arc<str>);

impl Token {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Complete exposition text produced by one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Concatenated fragments of every collector that succeeded
    pub body: String,
    /// When the aggregation run finished
    pub produced_at: DateTime<Utc>,
    /// Collectors that contributed to `body`, in collector order
    pub collectors: Vec<String>,
}

impl Snapshot {
    /// Build a snapshot from per-collector fragment lists, preserving order.
    pub fn assemble<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut body = String::new();
        let mut collectors = Vec::new();

        for (name, fragments) in parts {
            for fragment in &fragments {
                body.push_str(fragment);
            }
            collectors.push(name);
        }

        Self {
            body,
            produced_at: Utc::now(),
            collectors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Age of the snapshot relative to `now`, zero if produced in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.produced_at).to_std().unwrap_or_default()
    }
}

/// A collector that failed during one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorFailure {
    pub collector: String,
    pub error: String,
}

/// What a refresh cycle did with the snapshot cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new snapshot replaced the cached one
    Published {
        succeeded: usize,
        failed: Vec<CollectorFailure>,
    },
    /// Aggregation failed; the previous snapshot stays authoritative
    Retained { reason: String },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Published { failed, .. } if failed.is_empty() => "published",
            Self::Published { .. } => "published_partial",
            Self::Retained { .. } => "retained",
        }
    }
}

/// One execution of the refresh loop body.
#[derive(Debug, Clone)]
pub struct RefreshCycle {
    pub sequence: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: CycleOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("super-secret");
        assert_eq!(format!("{token:?}"), "Token(<redacted>)");
        assert_eq!(token.as_str(), "super-secret");
    }

    #[test]
    fn test_snapshot_assemble_keeps_order() {
        let snapshot = Snapshot::assemble(vec![
            ("vms".to_string(), vec!["a\n".to_string(), "b\n".to_string()]),
            ("hosts".to_string(), vec![]),
            ("clusters".to_string(), vec!["c\n".to_string()]),
        ]);

        assert_eq!(snapshot.body, "a\nb\nc\n");
        assert_eq!(snapshot.collectors, vec!["vms", "hosts", "clusters"]);
    }

    #[test]
    fn test_snapshot_age_never_negative() {
        let snapshot = Snapshot::assemble(Vec::new());
        let earlier = snapshot.produced_at - chrono::Duration::seconds(10);
        assert_eq!(snapshot.age(earlier), Duration::ZERO);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_cycle_outcome_label() {
        let clean = CycleOutcome::Published {
            succeeded: 5,
            failed: vec![],
        };
        let partial = CycleOutcome::Published {
            succeeded: 3,
            failed: vec![CollectorFailure {
                collector: "vms".to_string(),
                error: "boom".to_string(),
            }],
        };
        let retained = CycleOutcome::Retained {
            reason: "no token".to_string(),
        };

        assert_eq!(clean.label(), "published");
        assert_eq!(partial.label(), "published_partial");
        assert_eq!(retained.label(), "retained");
    }
}
