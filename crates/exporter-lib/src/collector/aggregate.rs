//! One aggregation run: acquire a token, fan out, join in collector order

use super::CollectorSet;
use crate::error::Result;
use crate::models::{CollectorFailure, Snapshot};
use crate::token::TokenCache;
use std::sync::Arc;
use tracing::debug;

/// Result of a run in which the token was obtained
#[derive(Debug)]
pub struct Aggregation {
    pub snapshot: Snapshot,
    pub failures: Vec<CollectorFailure>,
    /// Fragments contributed by each successful collector
    pub fragment_counts: Vec<(String, usize)>,
}

impl Aggregation {
    pub fn succeeded(&self) -> usize {
        self.fragment_counts.len()
    }
}

/// Runs every collector concurrently against a single token
#[derive(Clone)]
pub struct Aggregator {
    tokens: Arc<TokenCache>,
    collectors: CollectorSet,
}

impl Aggregator {
    pub fn new(tokens: Arc<TokenCache>, collectors: CollectorSet) -> Self {
        Self { tokens, collectors }
    }

    pub fn collectors(&self) -> &CollectorSet {
        &self.collectors
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Produce a snapshot candidate.
    ///
    /// Fails only when no token can be obtained, in which case no collector
    /// runs. Collector failures (errors or panics) are isolated: the failing
    /// collector contributes nothing and is reported in `failures`. The body
    /// follows collector order whatever order the tasks finish in.
    pub async fn run(&self) -> Result<Aggregation> {
        let token = self.tokens.acquire().await?;

        let handles: Vec<_> = self
            .collectors
            .iter()
            .map(|collector| {
                let collector = Arc::clone(collector);
                let token = token.clone();
                let name = collector.name().to_string();
                let handle = tokio::spawn(async move { collector.collect(&token).await });
                (name, handle)
            })
            .collect();

        let mut parts = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(fragments)) => {
                    debug!(collector = %name, fragments = fragments.len(), "Collector finished");
                    parts.push((name, fragments));
                }
                Ok(Err(e)) => failures.push(CollectorFailure {
                    collector: name,
                    error: e.to_string(),
                }),
                Err(e) => failures.push(CollectorFailure {
                    collector: name,
                    error: format!("collector task aborted: {e}"),
                }),
            }
        }

        let fragment_counts = parts
            .iter()
            .map(|(name, fragments)| (name.clone(), fragments.len()))
            .collect();

        Ok(Aggregation {
            snapshot: Snapshot::assemble(parts),
            failures,
            fragment_counts,
        })
    }
}
